mod engine;

pub use engine::EngineService;
