use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    name = "schemacast",
    version,
    about = "Browse schema-registry subjects, draft Avro payloads and publish or consume them on Kafka"
)]
pub struct Cli {
    /// Choose a configuration profile interactively before starting
    #[arg(short = 's', long = "select-config")]
    pub select_config: bool,
}
