use candle_core::Device;

/// Compute device for the BERT embedder: Metal ordinal 0 when built with `metal` and available, else CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => {
                tracing::info!(device = "metal", ordinal = 0, "embedding compute device selected");
                return dev;
            }
            Err(e) => tracing::warn!(device = "metal", error = %e, "metal unavailable, falling back to cpu"),
        }
    }
    tracing::info!(device = "cpu", "embedding compute device selected");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "metal"))]
    #[test]
    fn default_build_embeds_on_cpu() {
        assert!(matches!(select_device(), Device::Cpu));
    }
}
