//! Dispatch-error translation
//!
//! Module errors arrive as a bare (pallet index, error index) pair. The
//! runtime metadata knows what they mean; [`translate`] asks an
//! [`ErrorRegistry`] for that description and falls back to the raw code if
//! the lookup fails for any reason.

use crate::error::{ChainError, Result};
use crate::status::{DispatchError, ModuleError, StatusUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Generic,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleErrorCode {
    pub pallet_index: u8,
    pub error_index: u8,
    /// Pallet name, when the registry knew it.
    pub section: Option<String>,
    /// Error variant name, when the registry knew it.
    pub name: Option<String>,
}

impl From<ModuleError> for ModuleErrorCode {
    fn from(err: ModuleError) -> Self {
        Self {
            pallet_index: err.pallet_index,
            error_index: err.error_index,
            section: None,
            name: None,
        }
    }
}

/// User-facing description of a rejected submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    pub module_error: Option<ModuleErrorCode>,
}

impl ErrorDetail {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Generic,
            message: message.into(),
            module_error: None,
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Metadata entry describing one module error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleErrorMeta {
    pub section: String,
    pub name: String,
    #[serde(default)]
    pub docs: Vec<String>,
}

impl ModuleErrorMeta {
    pub fn new(section: impl Into<String>, name: impl Into<String>, docs: &[&str]) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            docs: docs.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Human-readable form, e.g. `Balances.InsufficientBalance: Balance too low to send value.`
    pub fn describe(&self) -> String {
        if self.docs.is_empty() {
            format!("{}.{}", self.section, self.name)
        } else {
            format!("{}.{}: {}", self.section, self.name, self.docs.join(" "))
        }
    }
}

/// Source of module error metadata.
pub trait ErrorRegistry: Send + Sync {
    fn resolve_module_error(&self, error: &ModuleError) -> Result<ModuleErrorMeta>;
}

/// Build the [`ErrorDetail`] for a rejected update.
pub fn translate<R>(update: &StatusUpdate, registry: &R) -> ErrorDetail
where
    R: ErrorRegistry + ?Sized,
{
    match &update.dispatch_error {
        Some(error) => translate_dispatch_error(error, registry),
        None => match &update.internal_error {
            Some(internal) => ErrorDetail::generic(internal.clone()),
            None => ErrorDetail::generic(format!(
                "extrinsic {} rejected at phase {}",
                update.tx_hash_hex(),
                update.phase
            )),
        },
    }
}

pub fn translate_dispatch_error<R>(error: &DispatchError, registry: &R) -> ErrorDetail
where
    R: ErrorRegistry + ?Sized,
{
    let module = match error {
        DispatchError::Module(module) => *module,
        other => return ErrorDetail::generic(other.to_string()),
    };

    match registry.resolve_module_error(&module) {
        Ok(meta) => ErrorDetail {
            kind: ErrorKind::Module,
            message: meta.describe(),
            module_error: Some(ModuleErrorCode {
                pallet_index: module.pallet_index,
                error_index: module.error_index,
                section: Some(meta.section),
                name: Some(meta.name),
            }),
        },
        Err(e) => {
            warn!("Failed to resolve {}: {}", module, e);
            ErrorDetail {
                kind: ErrorKind::Module,
                message: module.to_string(),
                module_error: Some(module.into()),
            }
        }
    }
}

/// In-memory metadata table keyed by (pallet index, error index).
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: HashMap<(u8, u8), ModuleErrorMeta>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pallet_index: u8, error_index: u8, meta: ModuleErrorMeta) {
        self.entries.insert((pallet_index, error_index), meta);
    }

    pub fn with(mut self, pallet_index: u8, error_index: u8, meta: ModuleErrorMeta) -> Self {
        self.register(pallet_index, error_index, meta);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ErrorRegistry for MetadataRegistry {
    fn resolve_module_error(&self, error: &ModuleError) -> Result<ModuleErrorMeta> {
        self.entries
            .get(&(error.pallet_index, error.error_index))
            .cloned()
            .ok_or_else(|| ChainError::RegistryError(format!("no metadata for {}", error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TxPhase;

    const BALANCES: u8 = 5;

    struct BrokenRegistry;

    impl ErrorRegistry for BrokenRegistry {
        fn resolve_module_error(&self, _error: &ModuleError) -> Result<ModuleErrorMeta> {
            Err(ChainError::RegistryError("metadata unavailable".to_string()))
        }
    }

    fn balances_registry() -> MetadataRegistry {
        MetadataRegistry::new().with(
            BALANCES,
            3,
            ModuleErrorMeta::new(
                "Balances",
                "InsufficientBalance",
                &["Balance too low to send value."],
            ),
        )
    }

    fn failed_update(error: DispatchError) -> StatusUpdate {
        StatusUpdate::new(TxPhase::InBlock, [3u8; 32]).with_dispatch_error(error)
    }

    fn balances_error() -> DispatchError {
        DispatchError::Module(ModuleError {
            pallet_index: BALANCES,
            error_index: 3,
        })
    }

    #[test]
    fn test_module_error_translated_from_registry() {
        let registry = balances_registry();
        let detail = translate(&failed_update(balances_error()), &registry);

        assert_eq!(detail.kind, ErrorKind::Module);
        assert_eq!(
            detail.message,
            registry
                .resolve_module_error(&ModuleError {
                    pallet_index: BALANCES,
                    error_index: 3
                })
                .unwrap()
                .describe()
        );
        let code = detail.module_error.unwrap();
        assert_eq!(code.section.as_deref(), Some("Balances"));
        assert_eq!(code.name.as_deref(), Some("InsufficientBalance"));
    }

    #[test]
    fn test_registry_failure_falls_back_to_raw_code() {
        let detail = translate(&failed_update(balances_error()), &BrokenRegistry);

        assert_eq!(detail.kind, ErrorKind::Module);
        assert_eq!(detail.message, "module error (pallet 5, error 3)");
        let code = detail.module_error.unwrap();
        assert_eq!((code.pallet_index, code.error_index), (BALANCES, 3));
        assert!(code.section.is_none());
    }

    #[test]
    fn test_unknown_module_error_falls_back() {
        let detail = translate(
            &failed_update(DispatchError::Module(ModuleError {
                pallet_index: 40,
                error_index: 1,
            })),
            &balances_registry(),
        );
        assert_eq!(detail.message, "module error (pallet 40, error 1)");
    }

    #[test]
    fn test_non_module_errors_pass_through() {
        let detail = translate(&failed_update(DispatchError::BadOrigin), &BrokenRegistry);
        assert_eq!(detail.kind, ErrorKind::Generic);
        assert_eq!(detail.message, "Bad origin");
        assert!(detail.module_error.is_none());

        let other = translate(
            &failed_update(DispatchError::Other("Exhausted".to_string())),
            &BrokenRegistry,
        );
        assert_eq!(other.message, "Exhausted");
    }

    #[test]
    fn test_update_without_dispatch_error() {
        let update = StatusUpdate::new(TxPhase::Dropped, [0u8; 32]);
        let detail = translate(&update, &BrokenRegistry);
        assert_eq!(detail.kind, ErrorKind::Generic);
        assert!(detail.message.contains("dropped"));
    }
}
