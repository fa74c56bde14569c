pub struct DefaultsConfig {
    pub num_designs: usize,
    pub backbone_checkpoint: String,
    pub sequence_checkpoint: String,
    pub prediction_checkpoint: String,
    pub scratch_dir_name: String,
    pub keep_scratch: bool,
    pub deterministic: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            num_designs: 10,
            backbone_checkpoint: "rfdiffusion".to_string(),
            sequence_checkpoint: "proteinmpnn".to_string(),
            prediction_checkpoint: "rf2".to_string(),
            scratch_dir_name: "scratch".to_string(),
            keep_scratch: false,
            deterministic: false,
        }
    }
}
