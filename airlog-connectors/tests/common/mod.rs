//! Shared fixtures for connector tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const STX: u8 = 0x02;
const CR: u8 = b'\r';

/// One PCE-AQD 20 line with one decimal place
pub fn pce_line(kind: u8, unit: &[u8; 2], value: f64) -> Vec<u8> {
    let sign = if value < 0.0 { b'1' } else { b'0' };
    let magnitude = (value.abs() * 10.0).round() as u32;

    let mut line = vec![STX, b'4', kind];
    line.extend_from_slice(unit);
    line.extend_from_slice(&[sign, b'1']);
    line.extend_from_slice(format!("{:08}", magnitude).as_bytes());
    line.push(CR);
    line
}

pub fn pce_dataset(pm25: f64, humidity: f64, temperature: f64, co2: f64, pressure: f64) -> Vec<Vec<u8>> {
    vec![
        pce_line(b'1', b"H0", pm25),
        pce_line(b'2', b"04", humidity),
        pce_line(b'3', b"01", temperature),
        pce_line(b'4', b"G4", co2),
        pce_line(b'5', b"91", pressure),
    ]
}

/// Scratch directory holding capture and output files
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Text capture, one frame per line
    pub fn capture(&self, name: &str, frames: &[Vec<u8>]) -> PathBuf {
        let mut bytes = Vec::new();
        for frame in frames {
            bytes.extend_from_slice(frame);
            bytes.push(b'\n');
        }
        let path = self.path(name);
        fs::write(&path, bytes).expect("write capture");
        path
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).expect("read output")
    }
}

/// JSON string literal for a path
pub fn quoted(path: &Path) -> String {
    serde_json::to_string(path).expect("path is UTF-8")
}

/// Stop condition that allows `steps` loop iterations
pub fn after(steps: usize) -> impl FnMut() -> bool {
    let mut taken = 0;
    move || {
        taken += 1;
        taken > steps
    }
}
