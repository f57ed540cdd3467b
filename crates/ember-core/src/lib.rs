// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Install the global `tracing` subscriber. Filter comes from `RUST_LOG`;
/// without it only `info` and above are shown. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Log a fatal error and its context chain through `tracing` before the
/// process goes down.
pub fn report_fatal(err: &anyhow::Error) {
    tracing::error!("fatal: {err:#}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn fatal_report_accepts_a_context_chain() {
        init_tracing();
        let err = Err::<(), _>(anyhow::anyhow!("VK_ERROR_OUT_OF_HOST_MEMORY"))
            .context("create_fence")
            .context("frame slot pool")
            .unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "frame slot pool: create_fence: VK_ERROR_OUT_OF_HOST_MEMORY"
        );
        report_fatal(&err);
    }
}
