//! `ayu probe`: is a dashboard listening?

use ayu_core::channel::{self, ChannelConfig};

/// Print the result and return whether something answered.
pub async fn run_probe(config: &ChannelConfig) -> bool {
    let listening = channel::probe(&config.host, config.port, config.connect_timeout).await;
    if listening {
        println!("dashboard listening at {}", config.addr());
    } else {
        println!("no dashboard at {}", config.addr());
    }
    listening
}
