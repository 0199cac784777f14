//! Sound: play a file and control it from the keyboard.
//!
//! ```text
//! cargo run --example sound --features audio -- path/to/clip.ogg
//! ```
//!
//! Space pauses and resumes, Up/Down change the listener gain, R restarts
//! and Escape quits.

use std::path::PathBuf;
use std::time::Duration;

use tessera::audio::{Audio, AudioError, Source};
use tessera::prelude::*;

struct Player {
    clip: PathBuf,
    key: Option<String>,
    source: Option<Source>,
}

impl Player {
    fn start_clip(&mut self, audio: &mut Audio) -> Result<(), AudioError> {
        let key = match &self.key {
            Some(key) => key.clone(),
            None => audio.load(&self.clip)?,
        };
        self.source = Some(audio.play_named(&key)?);
        self.key = Some(key);
        Ok(())
    }
}

impl GameInterface for Player {
    fn start(&mut self, ctx: &mut Context) {
        let Some(audio) = ctx.audio.as_mut() else {
            log::error!("No audio device");
            ctx.stop();
            return;
        };
        if let Err(e) = self.start_clip(audio) {
            log::error!("{e}");
            ctx.stop();
        }
    }

    fn input(&mut self, ctx: &mut Context, _delta: Duration) {
        if ctx.input.just_pressed(KeyCode::Escape) {
            ctx.stop();
            return;
        }
        let Some(audio) = ctx.audio.as_mut() else {
            return;
        };

        if ctx.input.just_pressed(KeyCode::Space) {
            if let Some(source) = self.source.as_mut() {
                if source.is_paused() {
                    source.resume();
                } else {
                    source.pause();
                }
            }
        }
        if ctx.input.just_pressed(KeyCode::ArrowUp) {
            audio.set_gain((audio.gain() + 0.1).min(1.0));
            log::info!("Gain {:.1}", audio.gain());
        }
        if ctx.input.just_pressed(KeyCode::ArrowDown) {
            audio.set_gain((audio.gain() - 0.1).max(0.0));
            log::info!("Gain {:.1}", audio.gain());
        }
        if ctx.input.just_pressed(KeyCode::KeyR) {
            if let Some(mut old) = self.source.take() {
                old.stop();
            }
            if let Err(e) = self.start_clip(audio) {
                log::warn!("{e}");
            }
        }
    }

    fn update(&mut self, _ctx: &mut Context, _step: Duration) {
        if self.source.as_ref().is_some_and(Source::is_stopped) {
            log::info!("Finished; press R to replay");
            self.source = None;
        }
    }
}

fn main() {
    let Some(clip) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: sound <file.ogg|wav|mp3|flac>");
        std::process::exit(2);
    };
    let config = EngineConfig {
        title: "tessera: sound".to_string(),
        ..EngineConfig::default()
    };
    let player = Player {
        clip,
        key: None,
        source: None,
    };
    if let Err(e) = Engine::new(GamePreferences::default(), config).run(player) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
