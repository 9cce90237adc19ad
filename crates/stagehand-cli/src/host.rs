//! A binary host that validates and logs binaries without running them.

use stagehand_loader::{BinaryHost, LoadedBinary, LoaderError, LoaderResult};
use tracing::info;
use wasmparser::{Parser, Payload};

/// Accepts any valid WebAssembly module and exports no plugins.
#[derive(Debug, Default)]
pub(crate) struct LoggingHost;

impl BinaryHost for LoggingHost {
    fn load(&self, name: &str, bytes: &[u8]) -> LoaderResult<LoadedBinary> {
        wasmparser::validate(bytes).map_err(|e| LoaderError::Binary {
            name: name.to_owned(),
            message: e.to_string(),
        })?;
        let exports = count_exports(bytes);
        info!(binary = %name, bytes = bytes.len(), exports, "Binary loaded");
        Ok(LoadedBinary::new(name, Vec::new()))
    }
}

fn count_exports(bytes: &[u8]) -> u32 {
    Parser::new(0)
        .parse_all(bytes)
        .filter_map(Result::ok)
        .find_map(|payload| match payload {
            Payload::ExportSection(reader) => Some(reader.count()),
            _ => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // (module (func (export "run")))
    const MODULE: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
        0x03, 0x02, 0x01, 0x00, // function section
        0x07, 0x07, 0x01, 0x03, b'r', b'u', b'n', 0x00, 0x00, // export section
        0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // code section
    ];

    #[test]
    fn valid_module_loads_without_plugins() {
        let loaded = LoggingHost.load("Game.wasm", MODULE).unwrap();
        assert_eq!(loaded.name(), "Game.wasm");
        assert!(loaded.plugins().is_empty());
        assert_eq!(count_exports(MODULE), 1);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = LoggingHost.load("Bad.wasm", b"not wasm").unwrap_err();
        assert!(matches!(err, LoaderError::Binary { ref name, .. } if name == "Bad.wasm"));
    }
}
