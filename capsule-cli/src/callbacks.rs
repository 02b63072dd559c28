//! Kernels loaded from shared libraries
//!
//! An external kernel is a C function with one of the host signatures,
//! exported from a dynamic library. It is wrapped in an ordinary capsule;
//! the library stays loaded for as long as the capsule exists.

use crate::config::ExternalKernelConfig;
use anyhow::{Context, Result};
use capsule_kernels::{
    BlobAllocator, Capsule, ContextData, Filter1dFn, KernelEntry, KernelKind, StencilFn,
    TransformFn,
};
use libloading::Library;
use std::sync::Arc;

/// Capsule built around a symbol from a loaded library
pub struct ExternalKernel {
    // Declared before `_library` so the capsule is dropped first.
    capsule: Capsule,
    _library: Library,
}

impl ExternalKernel {
    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }
}

/// Load `config.symbol` from `config.library` and wrap it with `data`
pub fn load_external(
    config: &ExternalKernelConfig,
    data: &ContextData,
    allocator: Arc<dyn BlobAllocator>,
) -> Result<ExternalKernel> {
    log::info!(
        "Loading {} kernel '{}' from {:?}",
        config.kind,
        config.symbol,
        config.library
    );

    // SAFETY: loading runs the library's initialisers; the library is
    // trusted configuration input.
    let library = unsafe { Library::new(&config.library) }
        .with_context(|| format!("Failed to load kernel library: {:?}", config.library))?;

    let entry = unsafe { resolve_entry(&library, &config.symbol, config.kind) }
        .with_context(|| {
            format!(
                "Symbol '{}' not found in {:?}",
                config.symbol, config.library
            )
        })?;

    // SAFETY: the configuration declares the symbol's signature and context
    // layout; the entry is only called while `library` is loaded.
    let capsule = unsafe { Capsule::from_entry(entry, data, allocator) }
        .with_context(|| format!("Failed to build capsule for '{}'", config.symbol))?;

    Ok(ExternalKernel {
        capsule,
        _library: library,
    })
}

/// # Safety
///
/// The symbol must really have the signature implied by `kind`.
unsafe fn resolve_entry(
    library: &Library,
    symbol: &str,
    kind: KernelKind,
) -> std::result::Result<KernelEntry, libloading::Error> {
    let name = symbol.as_bytes();
    Ok(match kind {
        KernelKind::Filter1d => KernelEntry::Filter1d(*library.get::<Filter1dFn>(name)?),
        KernelKind::Stencil => KernelEntry::Stencil(*library.get::<StencilFn>(name)?),
        KernelKind::Transform => KernelEntry::Transform(*library.get::<TransformFn>(name)?),
    })
}

/// Path of this workspace's built `capsule_kernels` cdylib, if cargo produced one
#[cfg(test)]
pub(crate) fn builtin_kernels_library() -> Option<std::path::PathBuf> {
    let name = libloading::library_filename("capsule_kernels");
    let exe = std::env::current_exe().ok()?;
    exe.ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join(&name))
        .find(|path| path.exists())
}
