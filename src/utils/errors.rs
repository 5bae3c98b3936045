//! User-Friendly Error Formatting
//!
//! Turns errors reaching the binary into a short report with likely causes
//! and the settings that usually fix them.

use std::fmt::Write;

use crate::buffers::PoolError;
use crate::pipeline::PipelineError;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(output).ok();
    writeln!(
        output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(output).ok();

    match pool_error(error) {
        Some(PoolError::WaitTimeout { timeout_ms }) => format_slot_timeout(&mut output, *timeout_ms),
        Some(PoolError::PoolExhausted { .. }) | Some(PoolError::AllocationFailed(_)) => {
            format_allocation_error(&mut output)
        }
        Some(_) => format_generic_error(&mut output, &error.to_string()),
        None => {
            let error_msg = error.to_string();
            if error_msg.contains("config") {
                format_config_error(&mut output);
            } else if error.downcast_ref::<PipelineError>().is_some() {
                format_hardware_error(&mut output);
            } else {
                format_generic_error(&mut output, &error_msg);
            }
        }
    }

    writeln!(output).ok();
    writeln!(
        output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(output, "Technical Details:").ok();
    writeln!(output).ok();
    writeln!(output, "{:#}", error).ok();
    writeln!(output).ok();
    writeln!(
        output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(output, "Need Help?").ok();
    writeln!(
        output,
        "  - Run with --verbose for slot-level logs: lamco-encode-buffers -vv"
    )
    .ok();
    writeln!(
        output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

/// Pool error anywhere in the chain, including inside a pipeline error
fn pool_error(error: &anyhow::Error) -> Option<&PoolError> {
    error.chain().find_map(|cause| {
        cause.downcast_ref::<PoolError>().or_else(|| {
            match cause.downcast_ref::<PipelineError>() {
                Some(PipelineError::Pool(inner)) => Some(inner),
                _ => None,
            }
        })
    })
}

fn format_slot_timeout(output: &mut String, timeout_ms: u64) {
    writeln!(output, "No Free Buffer Slot").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "A frame waited {}ms for a tracked buffer slot and gave up.",
        timeout_ms
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Too few slots for the reference structure").ok();
    writeln!(
        output,
        "     → num_ref_frames + sync_depth must fit in max_ref_slots + max_non_ref_slots"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Hardware completion slower than the wait").ok();
    writeln!(output, "     → Raise [pool] wait_timeout_ms").ok();
    writeln!(output, "     → Lower [session] hw_latency_ms or sync_depth").ok();
}

fn format_allocation_error(output: &mut String) {
    writeln!(output, "Resource Allocation Failed").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The allocator could not provide a surface or buffer for this frame."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Frame size too large for available memory").ok();
    writeln!(output, "     → Try a smaller --width/--height").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Slots never released").ok();
    writeln!(
        output,
        "     → Every prepared frame must be completed before its slot is reused"
    )
    .ok();
}

fn format_hardware_error(output: &mut String) {
    writeln!(output, "Hardware Simulation Error").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The simulated encode engine stopped reporting completed frames."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  → Check the log for a panic on the encode-hw thread").ok();
    writeln!(output, "  → Try a lower [session] hw_latency_ms").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "The configuration file could not be used.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. TOML syntax error").ok();
    writeln!(output, "     → Check brackets, quotes and key names").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid value").ok();
    writeln!(output, "     → lcu_size must be 16, 32 or 64").ok();
    writeln!(output, "     → Slot counts and sync_depth must be non-zero").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Operation Failed").ok();
    writeln!(output).ok();
    writeln!(output, "{}", error).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_user_error() {
        let error = anyhow::anyhow!("Test error");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("Test error"));
    }

    #[test]
    fn test_slot_timeout_formatting() {
        let error = anyhow::Error::new(PoolError::WaitTimeout { timeout_ms: 1000 });
        let formatted = format_user_error(&error);
        assert!(formatted.contains("No Free Buffer Slot"));
        assert!(formatted.contains("1000ms"));
    }

    #[test]
    fn test_pool_error_inside_pipeline_error() {
        let error = anyhow::Error::new(PipelineError::Pool(PoolError::AllocationFailed(
            "budget".to_string(),
        )))
        .context("Encode run failed");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Resource Allocation Failed"));
    }

    #[test]
    fn test_config_error_formatting() {
        let error = anyhow::anyhow!("Failed to parse config file");
        assert!(format_user_error(&error).contains("Configuration Error"));
    }
}
