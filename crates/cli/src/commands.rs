use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Rehearse a copy run against the built-in simulated instances
    Simulate {
        #[arg(long, default_value_t = 25, help = "Number of scans to synthesize")]
        scans: usize,

        #[arg(long, help = "Fail every n-th simulated transfer call with a 503")]
        fail_every: Option<u64>,

        #[arg(long, default_value_t = 25, help = "Simulated latency per call, in milliseconds")]
        latency_ms: u64,

        #[arg(long, help = "JSON file with engine configuration overrides")]
        config: Option<String>,

        #[arg(long, default_value = ".", help = "Directory for checkpoint files")]
        checkpoint_dir: String,

        #[arg(long, help = "Resume from the checkpoint discovered in the checkpoint directory")]
        resume: bool,

        #[arg(long, conflicts_with = "resume", help = "Delete discovered checkpoints and start over")]
        restart: bool,

        #[arg(long, help = "Resume from this specific checkpoint file")]
        checkpoint: Option<String>,

        #[arg(
            long,
            help = "If specified, writes the mapping report to this file instead of stdout"
        )]
        output: Option<String>,
    },

    /// List checkpoint files and the progress they hold
    Checkpoints {
        #[arg(long, default_value = ".", help = "Directory to search for checkpoint files")]
        dir: String,
    },

    /// Show how a scan id list would be partitioned into batches
    Plan {
        #[arg(long, help = "Comma-separated source scan ids")]
        scan_ids: String,

        #[arg(long, default_value_t = 10, help = "Scans per batch")]
        batch_size: usize,
    },
}
