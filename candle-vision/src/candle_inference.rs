pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub warmup_epochs: usize,
    pub min_learning_rate: f32,
    pub use_scheduler: bool,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 256,
            num_epochs: 200,
            warmup_epochs: 10,
            min_learning_rate: 1e-6,
            use_scheduler: false,
            device: candle_core::Device::Cpu,
            verbose: false,
            show_progress: true,
        }
    }
}
