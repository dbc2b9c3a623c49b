use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub struct Args {
    /// Gearman server host.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Gearman server port.
    #[arg(short, long, default_value_t = 4730)]
    pub port: u16,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submits one job and prints its result.
    Submit {
        /// Registered function name.
        function: String,
        /// Workload, sent as UTF-8 bytes.
        workload: String,
        /// Submit as a background job instead of waiting for completion.
        #[arg(short, long, default_value_t)]
        background: bool,
    },
    /// Registers a function that echoes its workload back unchanged.
    Echo {
        /// Function name to register.
        function: String,
    },
}
