pub mod config;
pub mod http;
pub mod meter;
pub mod recording;
pub mod session;

pub use config::Config;
pub use http::{create_router, AppState};
pub use meter::{Level, MeterError, MeteringSource, SyntheticMeter, SyntheticMeterConfig};
pub use recording::{
    record_name, Batch, CsvFileSink, FlushInterval, IntervalError, MemorySink, PersistenceSink,
    Reading, SampleBuffer,
};
pub use session::{SessionConfig, SessionController, SessionState, SessionStats};
