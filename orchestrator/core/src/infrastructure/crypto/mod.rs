// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Secret Encryption Core
//!
//! Field-level authenticated encryption of secrets inside JSON documents.
//! [`cipher`] seals single values into the `***ENC:<base64>***` wire form;
//! [`sanitizer`] walks a document and decides which leaves to seal.

pub mod cipher;
pub mod sanitizer;

pub use cipher::{is_encrypted, CryptoError, SecretCipher};
pub use sanitizer::{SecretClassifier, SecretSanitizer, SANITIZED_PLACEHOLDER};
