pub mod error;
pub mod memory;
pub mod redis_engine;
pub mod runtime;
pub mod scripts;

pub use error::EngineError;
pub use memory::InMemorySeatEngine;
pub use redis_engine::RedisSeatEngine;
pub use runtime::ScriptRuntime;
