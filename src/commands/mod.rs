use std::path::PathBuf;

use deckhand::config::DeployConfig;

pub type CmdResult<T> = deckhand::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config: PathBuf,
}

impl GlobalArgs {
    /// Load and resolve the configuration file named on the command line.
    pub fn load_config(&self) -> deckhand::Result<DeployConfig> {
        if !self.config.exists() {
            return Err(deckhand::Error::validation_invalid_argument(
                "config",
                "Config file not found",
                Some(self.config.display().to_string()),
                None,
            )
            .with_hint(format!(
                "Create {} with at least {{\"application\": \"...\", \"repository\": \"...\", \"servers\": [...]}}",
                self.config.display()
            )));
        }
        deckhand::config::load(&self.config)
    }
}

pub mod cleanup;
pub mod deploy;
pub mod plan;
pub mod releases;
pub mod setup;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run_json($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (deckhand::Result<serde_json::Value>, i32) {
    crate::tty::status("deckhand is working...");

    match command {
        // Commands without global context
        crate::Commands::Plan(args) => dispatch!(args, plan),

        // Commands with global context
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Setup(args) => dispatch!(args, global, setup),
        crate::Commands::Cleanup(args) => dispatch!(args, global, cleanup),
        crate::Commands::Releases(args) => dispatch!(args, global, releases),
    }
}
