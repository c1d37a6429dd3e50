use std::path::PathBuf;

use ittrefcol_abi::{RawContextType, RawMetadataType};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("cannot open log file {}: {source}", path.display())]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("static part handle is null")]
    NullPart,
    #[error("collector is not active")]
    NotActive,
    #[error("object registry is not initialized")]
    RegistryNotReady,
    #[error("unknown metadata type {0}")]
    UnknownMetadataType(RawMetadataType),
    #[error("unknown context metadata type {0}")]
    UnknownContextType(RawContextType),
    #[error("no domain named {0:?} in the registry")]
    UnknownDomain(String),
    #[error("{0} is null")]
    Missing(&'static str),
    #[error("out of memory growing the {0} list")]
    OutOfMemory(&'static str),
}
