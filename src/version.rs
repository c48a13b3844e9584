use std::sync::LazyLock;

/// Version of the software as reported by `--version` and the startup log.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| env!("CARGO_PKG_VERSION").to_string());
