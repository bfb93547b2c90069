//! Structured error types for formscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the host compiler/loader bindings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Host binding {binding} unavailable: {reason}")]
    BindingUnavailable { binding: String, reason: String },

    #[error("Failed to attach {point}: {reason}")]
    AttachRefused { point: String, reason: String },

    #[error("Unable to resolve symbol: {0}")]
    Unresolved(String),

    #[error("Namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("Host call failed: {0}")]
    Other(String),
}

/// Malformed or unsupported compiled-unit bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("Truncated unit: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Bad magic number 0x{0:08x}")]
    BadMagic(u32),

    #[error("Unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { index: u16, tag: u8 },

    #[error("Constant pool index {0} out of range")]
    BadConstantIndex(u16),

    #[error("Constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },

    #[error("Invalid opcode 0x{opcode:02x} at code offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("Malformed switch at code offset {0}")]
    MalformedSwitch(usize),
}

/// Failure inside an interception point body. Never leaves the hook.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Interception body panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Failed to enumerate symbols of namespace {namespace}: {source}")]
    Enumerate {
        namespace: String,
        #[source]
        source: HostError,
    },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors from the reference host's source reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Unexpected end of input at line {line}")]
    UnexpectedEof { line: u32 },

    #[error("Unbalanced '{delimiter}' at line {line}")]
    Unbalanced { delimiter: char, line: u32 },

    #[error("Invalid token '{token}' at line {line}")]
    InvalidToken { token: String, line: u32 },

    #[error("Metadata must precede a symbol or collection at line {line}")]
    DanglingMetadata { line: u32 },
}

/// Errors from compiling source in the reference host.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
