//! Log target of the node.
//!
//! Every line about the border router is logged under the device name, so
//! several nodes sharing one serial capture or syslog stay apart. The name
//! is fixed once per process by [`set_tag`]; later calls keep the first one.

use std::sync::OnceLock;

/// Target used until a device name is set.
pub const DEFAULT_TAG: &str = "otbr";

static TAG: OnceLock<String> = OnceLock::new();

/// Sets the log target. Only the first call has an effect.
pub fn set_tag(device_name: &str) {
    let _ = TAG.set(device_name.to_string());
}

/// The log target: the device name, or [`DEFAULT_TAG`] before one is set.
pub fn tag() -> &'static str {
    TAG.get().map(String::as_str).unwrap_or(DEFAULT_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_device_name_wins() {
        set_tag("otbr-first");
        let first = tag();
        assert!(!first.is_empty());
        set_tag("otbr-second");
        assert_eq!(tag(), first);
    }
}
