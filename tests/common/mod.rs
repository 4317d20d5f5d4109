//! Shared test doubles for the integration tests

#![allow(dead_code)]

use imgbatch::services::{Codec, CodecError, ExportCoordinator, SourceImage};
use imgbatch::{BatchController, ConversionSettings, StateManager};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, timeout};

/// Codec whose output spells out the profile it ran with: `<input>|<format>|q<quality>`.
///
/// Inputs starting with `bad` fail to decode.
#[derive(Debug, Default)]
pub struct FakeCodec;

pub fn fake_output(input: &str, profile: &ConversionSettings) -> Vec<u8> {
    format!("{}|{}|q{}", input, profile.format, profile.quality).into_bytes()
}

impl Codec for FakeCodec {
    fn convert(
        &self,
        input: &[u8],
        profile: &ConversionSettings,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, CodecError> {
        progress(10);
        if input.starts_with(b"bad") {
            return Err(CodecError::Decode("not an image".to_string()));
        }
        progress(50);
        progress(90);
        Ok(fake_output(&String::from_utf8_lossy(input), profile))
    }
}

/// Codec that blocks conversions with a gated quality until the gate opens.
///
/// Ungated qualities behave like [`FakeCodec`].
#[derive(Default)]
pub struct GateCodec {
    gates: Mutex<HashMap<u8, Receiver<()>>>,
}

impl GateCodec {
    /// Hold every conversion at `quality` until the returned sender fires
    pub fn gate(&self, quality: u8) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.gates.lock().unwrap().insert(quality, rx);
        tx
    }
}

impl Codec for GateCodec {
    fn convert(
        &self,
        input: &[u8],
        profile: &ConversionSettings,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, CodecError> {
        progress(20);
        let gate = self.gates.lock().unwrap().remove(&profile.quality);
        if let Some(gate) = gate {
            // A dropped sender also opens the gate
            let _ = gate.recv();
        }
        FakeCodec.convert(input, profile, progress)
    }
}

/// Codec that panics on inputs starting with `panic`; otherwise like [`FakeCodec`].
#[derive(Debug, Default)]
pub struct PanicCodec;

impl Codec for PanicCodec {
    fn convert(
        &self,
        input: &[u8],
        profile: &ConversionSettings,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, CodecError> {
        if input.starts_with(b"panic") {
            panic!("codec crashed on {}", String::from_utf8_lossy(input));
        }
        FakeCodec.convert(input, profile, progress)
    }
}

pub fn sources(names: &[&str]) -> Vec<SourceImage> {
    names
        .iter()
        .map(|name| SourceImage::new(*name, name.as_bytes().to_vec()))
        .collect()
}

pub fn controller_with(codec: Arc<dyn Codec>) -> BatchController {
    BatchController::new(
        StateManager::new(),
        codec,
        Arc::new(ExportCoordinator::default()),
        tokio::runtime::Handle::current(),
    )
}

pub fn fake_controller() -> BatchController {
    controller_with(Arc::new(FakeCodec))
}

/// `wait_until_idle` with a deadline so a broken test fails instead of hanging
pub async fn settle(controller: &BatchController) {
    timeout(Duration::from_secs(5), controller.wait_until_idle())
        .await
        .expect("Timeout waiting for conversions to finish");
}
