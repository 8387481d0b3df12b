//! The plugins the hub ships with.

pub mod single_command;
pub mod terminal;
pub mod time_count;

use std::sync::Arc;

use ssehub_core::ServerConfig;
use ssehub_terminal::Executor;

use crate::plugin::Plugin;

pub use single_command::SingleCommandPlugin;
pub use terminal::TerminalPlugin;
pub use time_count::TimeCountPlugin;

/// The standard plugin set, in registration order.
pub fn default_plugins(config: &ServerConfig, executor: Arc<dyn Executor>) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(TimeCountPlugin::new(&config.timecount)),
        Arc::new(SingleCommandPlugin::new(
            &config.command,
            &config.terminal.host,
            Arc::clone(&executor),
        )),
        Arc::new(TerminalPlugin::new(config.terminal.clone(), executor)),
    ]
}
