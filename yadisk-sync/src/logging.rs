use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "yadisk_sync=debug,yadisk_core=debug,info"
    } else {
        "info"
    }
}

/// Installs the global subscriber; `RUST_LOG` wins over `--verbose`.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_enables_debug_for_own_crates() {
        assert_eq!(default_directive(false), "info");
        assert!(default_directive(true).contains("yadisk_sync=debug"));
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
    }
}
