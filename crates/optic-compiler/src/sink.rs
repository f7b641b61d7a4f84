//! Output sinks for compiled artifacts.
//!
//! A sink hands out a scoped writable output per generated class, closed
//! exactly once on all paths (via drop), and records service-descriptor
//! registrations for discovery.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Where compiled artifacts and service registrations go.
pub trait ClassSink {
    /// The scoped per-class output
    type Output: Write;

    /// Open the output for a generated class. `originating` names the
    /// source class the artifact was generated from.
    fn visit_class(&self, name: &str, originating: &str) -> io::Result<Self::Output>;

    /// Register `implementation` as a provider of `service`
    fn visit_service_descriptor(
        &self,
        service: &str,
        implementation: &str,
        originating: &str,
    ) -> io::Result<()>;
}

/// One recorded service registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    /// Service contract name
    pub service: String,
    /// Implementation (generated class) name
    pub implementation: String,
    /// Originating source class
    pub originating: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    classes: FxHashMap<String, Vec<u8>>,
    services: Vec<ServiceRegistration>,
}

/// In-memory sink for tests and in-process builds.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written for a generated class, if any
    pub fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().classes.get(name).cloned()
    }

    /// Number of classes written
    pub fn class_count(&self) -> usize {
        self.state.lock().classes.len()
    }

    /// All service registrations, in registration order
    pub fn service_registrations(&self) -> Vec<ServiceRegistration> {
        self.state.lock().services.clone()
    }
}

/// Scoped output of a [`MemorySink`]; flushes into the sink exactly once,
/// when dropped.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    state: Arc<Mutex<MemoryState>>,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.state
            .lock()
            .classes
            .insert(std::mem::take(&mut self.name), buffer);
    }
}

impl ClassSink for MemorySink {
    type Output = MemoryOutput;

    fn visit_class(&self, name: &str, _originating: &str) -> io::Result<MemoryOutput> {
        Ok(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            state: self.state.clone(),
        })
    }

    fn visit_service_descriptor(
        &self,
        service: &str,
        implementation: &str,
        originating: &str,
    ) -> io::Result<()> {
        self.state.lock().services.push(ServiceRegistration {
            service: service.to_string(),
            implementation: implementation.to_string(),
            originating: originating.to_string(),
        });
        Ok(())
    }
}

/// Directory sink: one `<name>.optb` file per class plus newline-separated
/// service files under `services/`.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    /// Create a sink rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the artifact file for a generated class
    pub fn class_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.optb"))
    }

    /// Path of the registration file for a service
    pub fn service_path(&self, service: &str) -> PathBuf {
        self.root.join("services").join(service)
    }
}

impl ClassSink for DirSink {
    type Output = fs::File;

    fn visit_class(&self, name: &str, _originating: &str) -> io::Result<fs::File> {
        fs::create_dir_all(&self.root)?;
        fs::File::create(self.class_path(name))
    }

    fn visit_service_descriptor(
        &self,
        service: &str,
        implementation: &str,
        _originating: &str,
    ) -> io::Result<()> {
        let path = self.service_path(service);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{implementation}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_flushes_on_drop() {
        let sink = MemorySink::new();
        {
            let mut output = sink.visit_class("geom.$Point$Introspection", "geom.Point").unwrap();
            output.write_all(b"abc").unwrap();
            // Not visible until the scoped output closes
            assert_eq!(sink.class_count(), 0);
        }
        assert_eq!(sink.class_count(), 1);
        assert_eq!(
            sink.class_bytes("geom.$Point$Introspection").as_deref(),
            Some(b"abc".as_slice())
        );
    }

    #[test]
    fn test_memory_service_registrations() {
        let sink = MemorySink::new();
        sink.visit_service_descriptor("optic.Ref", "geom.$Point$Introspection", "geom.Point")
            .unwrap();
        let services = sink.service_registrations();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].implementation, "geom.$Point$Introspection");
    }
}
