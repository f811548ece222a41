// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Snapshot Codec
//!
//! JSON + gzip framing for stored workflow requests. No header beyond the
//! gzip member itself.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Write};

#[derive(thiserror::Error, Debug)]
pub enum CompressionError {
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub fn compress<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, value)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

pub fn decompress<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CompressionError> {
    let decoder = GzDecoder::new(bytes);
    Ok(serde_json::from_reader(decoder)?)
}
