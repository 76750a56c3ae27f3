//! Provisioning console
//!
//! A subset of the OpenThread CLI, enough to provision a border router by
//! hand from a serial terminal:
//!
//! ```text
//! > dataset set active 0e08000000000001000000030000...
//! Done
//! > ifconfig up
//! Done
//! > thread start
//! Done
//! ```
//!
//! Each command prints its output lines followed by `Done`, or a single
//! `Error <code>: <name>` line.

use crate::dataset::{DatasetTlvs, OperationalDataset};
use crate::error::{Error, ThreadError};
use crate::thread::{ot_error, ThreadInstance};

const HELP: &[&str] = &[
    "channel",
    "dataset",
    "help",
    "ifconfig",
    "networkname",
    "state",
    "thread",
];

/// Console session. Holds the dataset being edited by `dataset init new`.
#[derive(Debug, Default)]
pub struct Cli {
    pending: Option<OperationalDataset>,
}

impl Cli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset staged by `dataset init new`, if any.
    pub fn pending(&self) -> Option<&OperationalDataset> {
        self.pending.as_ref()
    }

    /// Runs one command line and returns the lines to print.
    pub fn execute<I: ThreadInstance + ?Sized>(&mut self, instance: &mut I, line: &str) -> Vec<String> {
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            return Vec::new();
        }

        let result = match args[0] {
            "help" => Ok(HELP.iter().map(|s| s.to_string()).collect()),
            "state" => Ok(vec![instance.device_role().to_string()]),
            "ifconfig" => self.ifconfig(instance, &args[1..]),
            "thread" => self.thread(instance, &args[1..]),
            "dataset" => self.dataset(instance, &args[1..]),
            "channel" => active_field(instance, |ds| ds.channel.map(|c| c.to_string())),
            "networkname" => active_field(instance, |ds| ds.network_name.clone()),
            _ => Err(ot_error::INVALID_COMMAND),
        };

        match result {
            Ok(mut lines) => {
                lines.push("Done".to_string());
                lines
            }
            Err(code) => vec![format!("Error {}: {}", code, ot_error::name(code))],
        }
    }

    fn ifconfig<I: ThreadInstance + ?Sized>(
        &mut self,
        instance: &mut I,
        args: &[&str],
    ) -> Result<Vec<String>, i32> {
        match args {
            [] => Ok(vec![if instance.ip6_enabled() { "up" } else { "down" }.to_string()]),
            ["up"] => instance.set_ip6_enabled(true).map(|_| Vec::new()).map_err(code),
            ["down"] => instance.set_ip6_enabled(false).map(|_| Vec::new()).map_err(code),
            _ => Err(ot_error::INVALID_ARGS),
        }
    }

    fn thread<I: ThreadInstance + ?Sized>(
        &mut self,
        instance: &mut I,
        args: &[&str],
    ) -> Result<Vec<String>, i32> {
        match args {
            ["start"] => instance.set_thread_enabled(true).map(|_| Vec::new()).map_err(code),
            ["stop"] => instance.set_thread_enabled(false).map(|_| Vec::new()).map_err(code),
            _ => Err(ot_error::INVALID_ARGS),
        }
    }

    fn dataset<I: ThreadInstance + ?Sized>(
        &mut self,
        instance: &mut I,
        args: &[&str],
    ) -> Result<Vec<String>, i32> {
        match args {
            [] => {
                let pending = self.pending.as_ref().ok_or(ot_error::NOT_FOUND)?;
                Ok(describe(pending))
            }
            ["active"] => instance.active_dataset().map(|ds| describe(&ds)).map_err(code),
            ["active", "-x"] => {
                let ds = instance.active_dataset().map_err(code)?;
                let tlvs = ds.to_tlvs().map_err(|_| ot_error::FAILED)?;
                Ok(vec![tlvs.to_hex()])
            }
            ["set", "active", hex] => {
                let tlvs = DatasetTlvs::from_hex(hex).map_err(|_| ot_error::INVALID_ARGS)?;
                instance.set_active_tlvs(&tlvs).map_err(code)?;
                Ok(Vec::new())
            }
            ["init", "new"] => {
                self.pending = Some(instance.create_new_network().map_err(code)?);
                Ok(Vec::new())
            }
            ["init", "active"] => {
                self.pending = Some(instance.active_dataset().map_err(code)?);
                Ok(Vec::new())
            }
            ["channel", value] => {
                let channel: u8 = value.parse().map_err(|_| ot_error::INVALID_ARGS)?;
                let pending = self.pending.as_mut().ok_or(ot_error::INVALID_STATE)?;
                pending.apply_overrides(Some(channel), None);
                Ok(Vec::new())
            }
            ["networkname", name] => {
                let pending = self.pending.as_mut().ok_or(ot_error::INVALID_STATE)?;
                pending.apply_overrides(None, Some(*name));
                Ok(Vec::new())
            }
            ["commit", "active"] => {
                let pending = self.pending.as_ref().ok_or(ot_error::INVALID_STATE)?;
                instance.set_active_dataset(pending).map_err(code)?;
                self.pending = None;
                Ok(Vec::new())
            }
            ["clear"] => {
                self.pending = None;
                Ok(Vec::new())
            }
            _ => Err(ot_error::INVALID_ARGS),
        }
    }
}

fn active_field<I: ThreadInstance + ?Sized>(
    instance: &mut I,
    field: impl Fn(&OperationalDataset) -> Option<String>,
) -> Result<Vec<String>, i32> {
    let ds = instance.active_dataset().map_err(code)?;
    field(&ds).map(|v| vec![v]).ok_or(ot_error::NOT_FOUND)
}

fn describe(ds: &OperationalDataset) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(ts) = ds.active_timestamp {
        lines.push(format!("Active Timestamp: {}", ts.seconds));
    }
    if let Some(channel) = ds.channel {
        lines.push(format!("Channel: {}", channel));
    }
    if let Some(mask) = ds.channel_mask {
        lines.push(format!("Channel Mask: 0x{:08x}", mask));
    }
    if let Some(xpan) = ds.extended_pan_id {
        lines.push(format!("Ext PAN ID: {}", hex::encode(xpan)));
    }
    if let Some(prefix) = ds.mesh_local_prefix {
        lines.push(format!("Mesh Local Prefix: {}", format_prefix(&prefix)));
    }
    if let Some(name) = &ds.network_name {
        lines.push(format!("Network Name: {}", name));
    }
    if let Some(pan_id) = ds.pan_id {
        lines.push(format!("PAN ID: 0x{:04x}", pan_id));
    }
    lines
}

fn format_prefix(prefix: &[u8; 8]) -> String {
    let groups: Vec<String> = prefix
        .chunks(2)
        .map(|g| format!("{:x}", u16::from_be_bytes([g[0], g[1]])))
        .collect();
    format!("{}::/64", groups.join(":"))
}

/// Maps an error to the `otError` code the CLI prints.
pub fn code(err: Error) -> i32 {
    match err {
        Error::Thread(ThreadError::Rejected { code, .. }) => code,
        Error::Thread(ThreadError::NotFound) => ot_error::NOT_FOUND,
        Error::Thread(ThreadError::InvalidState(_)) | Error::Thread(ThreadError::NotInitialized) => {
            ot_error::INVALID_STATE
        }
        Error::Dataset(_) => ot_error::INVALID_ARGS,
        _ => ot_error::FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedThreadStack;
    use crate::storage_trait::{init_persistent_storage, lock_store, share};
    use crate::memory::MemoryStore;
    use crate::thread::{OtPlatformConfig, ThreadStack};

    fn stack() -> SimulatedThreadStack {
        let store = share(MemoryStore::new());
        init_persistent_storage(&mut *lock_store(&store).unwrap()).unwrap();
        let mut stack = SimulatedThreadStack::new(store);
        stack.init(&OtPlatformConfig::native(true)).unwrap();
        stack
    }

    fn run(stack: &SimulatedThreadStack, cli: &mut Cli, line: &str) -> Vec<String> {
        stack.with_lock(|instance| cli.execute(instance, line)).unwrap()
    }

    #[test]
    fn test_unknown_command() {
        let stack = stack();
        let mut cli = Cli::new();
        assert_eq!(run(&stack, &mut cli, "frobnicate"), ["Error 35: InvalidCommand"]);
        assert!(run(&stack, &mut cli, "   ").is_empty());
    }

    #[test]
    fn test_provision_by_hand() {
        let stack = stack();
        let mut cli = Cli::new();

        assert_eq!(run(&stack, &mut cli, "state"), ["disabled", "Done"]);
        assert_eq!(run(&stack, &mut cli, "dataset active"), ["Error 23: NotFound"]);
        assert_eq!(run(&stack, &mut cli, "thread start"), ["Error 13: InvalidState"]);

        let hex = OperationalDataset::new_random().to_tlvs().unwrap().to_hex();
        assert_eq!(run(&stack, &mut cli, &format!("dataset set active {}", hex)), ["Done"]);
        assert_eq!(run(&stack, &mut cli, "dataset active -x"), [hex.as_str(), "Done"]);

        assert_eq!(run(&stack, &mut cli, "ifconfig up"), ["Done"]);
        assert_eq!(run(&stack, &mut cli, "ifconfig"), ["up", "Done"]);
        assert_eq!(run(&stack, &mut cli, "thread start"), ["Done"]);
        assert_eq!(run(&stack, &mut cli, "state"), ["leader", "Done"]);
    }

    #[test]
    fn test_dataset_init_new_and_commit() {
        let stack = stack();
        let mut cli = Cli::new();

        assert_eq!(run(&stack, &mut cli, "dataset commit active"), ["Error 13: InvalidState"]);
        assert_eq!(run(&stack, &mut cli, "dataset init new"), ["Done"]);
        assert_eq!(run(&stack, &mut cli, "dataset channel 20"), ["Done"]);
        assert_eq!(run(&stack, &mut cli, "dataset networkname Attic"), ["Done"]);
        assert_eq!(cli.pending().unwrap().channel, Some(20));
        assert_eq!(run(&stack, &mut cli, "dataset commit active"), ["Done"]);
        assert!(cli.pending().is_none());

        assert_eq!(run(&stack, &mut cli, "channel"), ["20", "Done"]);
        assert_eq!(run(&stack, &mut cli, "networkname"), ["Attic", "Done"]);
    }

    #[test]
    fn test_bad_dataset_hex() {
        let stack = stack();
        let mut cli = Cli::new();
        assert_eq!(run(&stack, &mut cli, "dataset set active 0e0"), ["Error 7: InvalidArgs"]);
        assert_eq!(run(&stack, &mut cli, "dataset set active zz"), ["Error 7: InvalidArgs"]);
        // decodes, but lacks the network key
        assert_eq!(
            run(&stack, &mut cli, "dataset set active 000300000f"),
            ["Error 7: InvalidArgs"]
        );
    }

    #[test]
    fn test_format_prefix() {
        let prefix = [0xfd, 0x11, 0x22, 0x00, 0x00, 0x00, 0xab, 0xcd];
        assert_eq!(format_prefix(&prefix), "fd11:2200:0:abcd::/64");
    }
}
