// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! audioloop - periodic audio update loop on a cooperatively cancellable
//! thread.

mod audio;
mod config;

use audio::{linear_to_db, AudioManager};
use config::{ConfigManager, EngineConfig};
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn load_config() -> EngineConfig {
    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => {
            warn!("No config directory ({}), using defaults", e);
            return EngineConfig::default();
        }
    };

    let fresh = !manager.config_path().exists();
    match manager.load_config() {
        Ok(config) => {
            if fresh {
                if let Err(e) = manager.save_config(&config) {
                    warn!("Failed to write default config: {}", e);
                }
            }
            config
        }
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            EngineConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("audioloop=debug".parse()?)
                .add_directive("audioloop_sync=debug".parse()?),
        )
        .init();

    info!("Starting audioloop");

    let config = load_config();
    let mut manager = AudioManager::new(&config)?;

    let ids: Vec<_> = config
        .sources
        .iter()
        .map(|source| manager.create_sound(source))
        .collect();
    info!("Playing {} sound(s) for {:?}", ids.len(), config.run_duration());

    // Halfway through, stop the first sound and bring the rest down 6 dB.
    let half = config.run_duration() / 2;
    thread::sleep(half);
    if let Some(first) = ids.first() {
        manager.stop_sound(*first);
    }
    for (source, id) in config.sources.iter().zip(&ids).skip(1) {
        manager.set_sound_gain(*id, source.gain_db - 6.0);
    }
    let mix = manager.mix();
    info!(
        "Halfway: {} update(s), {} active sound(s), {} frame mix at peak {:.1} dB",
        manager.updates(),
        manager.active_sounds(),
        mix.frames(),
        linear_to_db(mix.peak())
    );
    thread::sleep(config.run_duration() - half);

    manager.finalize()?;
    info!(
        "Finished: {} update(s), {} sound(s) left, final peak {:.1} dB",
        manager.updates(),
        manager.active_sounds(),
        linear_to_db(manager.last_peak())
    );

    Ok(())
}
