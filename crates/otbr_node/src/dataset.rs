//! Thread operational dataset encoding.
//!
//! The stack accepts network credentials as a MeshCoP TLV byte string
//! (`otOperationalDatasetTlvs`). Controllers and other border routers hand
//! those bytes around as hex, e.g. the output of `dataset active -x`. This
//! module turns that hex into [`DatasetTlvs`], decodes the TLVs into an
//! [`OperationalDataset`] for validation and logging, and encodes datasets
//! created on the device.
//!
//! Unknown TLV types are preserved so a decoded dataset re-encodes to the
//! same credentials.
//!
//! # Examples
//!
//! ```
//! use otbr_node::dataset::{DatasetTlvs, OperationalDataset};
//!
//! let mut dataset = OperationalDataset::new_random();
//! dataset.apply_overrides(Some(15), Some("OpenThread-HA"));
//!
//! let tlvs = dataset.to_tlvs().unwrap();
//! let hex = tlvs.to_hex();
//! let decoded = DatasetTlvs::from_hex(&hex).unwrap().decode().unwrap();
//! assert_eq!(decoded.channel, Some(15));
//! assert_eq!(decoded.network_name.as_deref(), Some("OpenThread-HA"));
//! ```

use crate::config::MAX_NETWORK_NAME_LEN;
use crate::error::DatasetError;
use serde::{Deserialize, Serialize};

/// Maximum encoded dataset length (`OT_OPERATIONAL_DATASET_MAX_LENGTH`).
pub const MAX_DATASET_TLVS_LEN: usize = 254;

/// Channel mask covering 2.4 GHz channels 11-26 on page 0.
pub const DEFAULT_CHANNEL_MASK: u32 = 0x07ff_f800;

/// Key rotation time used for new networks, in hours.
pub const DEFAULT_KEY_ROTATION_HOURS: u16 = 672;

/// MeshCoP TLV type codes used in operational datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvType {
    Channel = 0,
    PanId = 1,
    ExtendedPanId = 2,
    NetworkName = 3,
    Pskc = 4,
    NetworkKey = 5,
    MeshLocalPrefix = 7,
    SecurityPolicy = 12,
    ActiveTimestamp = 14,
    PendingTimestamp = 51,
    DelayTimer = 52,
    ChannelMask = 53,
}

impl TlvType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Channel,
            1 => Self::PanId,
            2 => Self::ExtendedPanId,
            3 => Self::NetworkName,
            4 => Self::Pskc,
            5 => Self::NetworkKey,
            7 => Self::MeshLocalPrefix,
            12 => Self::SecurityPolicy,
            14 => Self::ActiveTimestamp,
            51 => Self::PendingTimestamp,
            52 => Self::DelayTimer,
            53 => Self::ChannelMask,
            _ => return None,
        })
    }
}

/// A raw TLV kept verbatim (types this module does not interpret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTlv {
    pub tlv_type: u8,
    pub value: Vec<u8>,
}

/// Decodes a hex string into at most `max_len` bytes.
///
/// Upper- and lower-case digits are accepted. Empty strings, odd lengths,
/// non-hex characters and oversize input are rejected.
pub fn hex_to_bytes(hex: &str, max_len: usize) -> Result<Vec<u8>, DatasetError> {
    if hex.is_empty() {
        return Err(DatasetError::EmptyHex);
    }
    if hex.len() % 2 != 0 {
        return Err(DatasetError::OddLength { len: hex.len() });
    }
    if hex.len() / 2 > max_len {
        return Err(DatasetError::TooLong {
            len: hex.len() / 2,
            max: max_len,
        });
    }
    hex::decode(hex).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { index, .. } => {
            DatasetError::InvalidHexDigit { index }
        }
        _ => DatasetError::OddLength { len: hex.len() },
    })
}

/// An encoded operational dataset, as accepted by `otDatasetSetActiveTlvs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTlvs {
    bytes: Vec<u8>,
}

impl DatasetTlvs {
    /// Wraps encoded TLV bytes, checking only the length limit.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DatasetError> {
        if bytes.is_empty() {
            return Err(DatasetError::EmptyHex);
        }
        if bytes.len() > MAX_DATASET_TLVS_LEN {
            return Err(DatasetError::TooLong {
                len: bytes.len(),
                max: MAX_DATASET_TLVS_LEN,
            });
        }
        Ok(Self { bytes })
    }

    /// Parses the hex form used by `dataset active -x` and controller UIs.
    pub fn from_hex(hex: &str) -> Result<Self, DatasetError> {
        let bytes = hex_to_bytes(hex.trim(), MAX_DATASET_TLVS_LEN)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lower-case hex, the same form the stack's CLI prints.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Decodes the TLVs into their components.
    pub fn decode(&self) -> Result<OperationalDataset, DatasetError> {
        OperationalDataset::from_tlv_bytes(&self.bytes)
    }
}

/// MeshCoP timestamp: 48-bit seconds, 15-bit ticks and the authoritative bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: u64,
    pub ticks: u16,
    pub authoritative: bool,
}

impl Timestamp {
    fn decode(value: &[u8]) -> Result<Self, DatasetError> {
        let raw: [u8; 8] = value.try_into().map_err(|_| DatasetError::InvalidValue {
            tlv: "timestamp",
            reason: format!("expected 8 bytes, got {}", value.len()),
        })?;
        let word = u64::from_be_bytes(raw);
        Ok(Self {
            seconds: word >> 16,
            ticks: ((word >> 1) & 0x7fff) as u16,
            authoritative: word & 1 == 1,
        })
    }

    fn encode(&self) -> [u8; 8] {
        let word = ((self.seconds & 0xffff_ffff_ffff) << 16)
            | (u64::from(self.ticks & 0x7fff) << 1)
            | u64::from(self.authoritative);
        word.to_be_bytes()
    }
}

/// Key rotation time and policy flag bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub rotation_time_hours: u16,
    pub flags: Vec<u8>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            rotation_time_hours: DEFAULT_KEY_ROTATION_HOURS,
            flags: vec![0xff, 0xf8],
        }
    }
}

/// Decoded Thread network credentials (`otOperationalDataset`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalDataset {
    pub active_timestamp: Option<Timestamp>,
    pub pending_timestamp: Option<Timestamp>,
    pub delay_timer_ms: Option<u32>,
    pub channel_page: u8,
    pub channel: Option<u16>,
    /// Supported channels as a bit mask (bit n = channel n).
    pub channel_mask: Option<u32>,
    pub extended_pan_id: Option<[u8; 8]>,
    pub mesh_local_prefix: Option<[u8; 8]>,
    pub network_key: Option<[u8; 16]>,
    pub network_name: Option<String>,
    pub pan_id: Option<u16>,
    pub pskc: Option<[u8; 16]>,
    pub security_policy: Option<SecurityPolicy>,
    /// TLVs of types not listed above, in their original order.
    pub unknown: Vec<RawTlv>,
}

fn fixed<const N: usize>(tlv: &'static str, value: &[u8]) -> Result<[u8; N], DatasetError> {
    value.try_into().map_err(|_| DatasetError::InvalidValue {
        tlv,
        reason: format!("expected {} bytes, got {}", N, value.len()),
    })
}

impl OperationalDataset {
    /// Generates credentials for a brand new network.
    ///
    /// Keys, PAN IDs and the mesh-local prefix are random; the channel is
    /// picked from 11-26 and the name is derived from the PAN ID. Callers
    /// usually follow up with [`apply_overrides`](Self::apply_overrides).
    pub fn new_random() -> Self {
        let mut pan_id: u16 = rand::random();
        if pan_id == 0xffff {
            pan_id = 0xfffe;
        }

        let mut mesh_local_prefix = [0u8; 8];
        mesh_local_prefix[0] = 0xfd;
        let global_id: [u8; 5] = rand::random();
        mesh_local_prefix[1..6].copy_from_slice(&global_id);

        Self {
            active_timestamp: Some(Timestamp {
                seconds: 1,
                ticks: 0,
                authoritative: false,
            }),
            channel_page: 0,
            channel: Some(11 + u16::from(rand::random::<u8>() % 16)),
            channel_mask: Some(DEFAULT_CHANNEL_MASK),
            extended_pan_id: Some(rand::random()),
            mesh_local_prefix: Some(mesh_local_prefix),
            network_key: Some(rand::random()),
            network_name: Some(format!("OpenThread-{:04x}", pan_id)),
            pan_id: Some(pan_id),
            pskc: Some(rand::random()),
            security_policy: Some(SecurityPolicy::default()),
            ..Default::default()
        }
    }

    /// Overrides channel and network name. The name is cut to 16 bytes on
    /// a character boundary.
    pub fn apply_overrides(&mut self, channel: Option<u8>, network_name: Option<&str>) {
        if let Some(channel) = channel {
            self.channel = Some(u16::from(channel));
        }
        if let Some(name) = network_name {
            self.network_name = Some(truncate_name(name).to_string());
        }
    }

    /// Checks that every component an active dataset needs is present.
    pub fn validate_active(&self) -> Result<(), DatasetError> {
        let required: [(&'static str, bool); 6] = [
            ("active timestamp", self.active_timestamp.is_some()),
            ("channel", self.channel.is_some()),
            ("extended PAN ID", self.extended_pan_id.is_some()),
            ("network key", self.network_key.is_some()),
            ("network name", self.network_name.is_some()),
            ("PAN ID", self.pan_id.is_some()),
        ];
        for (name, present) in required {
            if !present {
                return Err(DatasetError::MissingComponent(name));
            }
        }
        if let Some(channel) = self.channel {
            if self.channel_page == 0 && !(11..=26).contains(&channel) {
                return Err(DatasetError::InvalidValue {
                    tlv: "channel",
                    reason: format!("{} is not a 2.4 GHz channel", channel),
                });
            }
        }
        Ok(())
    }

    /// Decodes a TLV buffer filled in by the stack, `len` bytes of `buf`.
    ///
    /// A zero length is how a failed conversion shows up, so it is an error
    /// rather than an empty dataset.
    pub fn from_stack_tlvs(buf: &[u8], len: usize) -> Result<Self, DatasetError> {
        if len == 0 {
            return Err(DatasetError::EmptyTlvs);
        }
        Self::from_tlv_bytes(&buf[..len.min(buf.len())])
    }

    /// Decodes MeshCoP TLV bytes.
    pub fn from_tlv_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        if bytes.len() > MAX_DATASET_TLVS_LEN {
            return Err(DatasetError::TooLong {
                len: bytes.len(),
                max: MAX_DATASET_TLVS_LEN,
            });
        }

        let mut dataset = Self::default();
        let mut offset = 0;
        while offset < bytes.len() {
            if offset + 2 > bytes.len() {
                return Err(DatasetError::MalformedTlv { offset });
            }
            let tlv_type = bytes[offset];
            let len = bytes[offset + 1] as usize;
            let start = offset + 2;
            let end = start + len;
            if end > bytes.len() {
                return Err(DatasetError::MalformedTlv { offset });
            }
            dataset.decode_tlv(tlv_type, &bytes[start..end])?;
            offset = end;
        }
        Ok(dataset)
    }

    fn decode_tlv(&mut self, tlv_type: u8, value: &[u8]) -> Result<(), DatasetError> {
        let Some(known) = TlvType::from_u8(tlv_type) else {
            self.unknown.push(RawTlv {
                tlv_type,
                value: value.to_vec(),
            });
            return Ok(());
        };

        match known {
            TlvType::Channel => {
                let raw: [u8; 3] = fixed("channel", value)?;
                self.channel_page = raw[0];
                self.channel = Some(u16::from_be_bytes([raw[1], raw[2]]));
            }
            TlvType::PanId => {
                self.pan_id = Some(u16::from_be_bytes(fixed("PAN ID", value)?));
            }
            TlvType::ExtendedPanId => {
                self.extended_pan_id = Some(fixed("extended PAN ID", value)?);
            }
            TlvType::NetworkName => {
                if value.is_empty() || value.len() > MAX_NETWORK_NAME_LEN {
                    return Err(DatasetError::InvalidValue {
                        tlv: "network name",
                        reason: format!("length {}", value.len()),
                    });
                }
                let name = std::str::from_utf8(value).map_err(|_| DatasetError::InvalidValue {
                    tlv: "network name",
                    reason: "not UTF-8".to_string(),
                })?;
                self.network_name = Some(name.to_string());
            }
            TlvType::Pskc => self.pskc = Some(fixed("PSKc", value)?),
            TlvType::NetworkKey => self.network_key = Some(fixed("network key", value)?),
            TlvType::MeshLocalPrefix => {
                self.mesh_local_prefix = Some(fixed("mesh-local prefix", value)?);
            }
            TlvType::SecurityPolicy => {
                if value.len() < 3 {
                    return Err(DatasetError::InvalidValue {
                        tlv: "security policy",
                        reason: format!("length {}", value.len()),
                    });
                }
                self.security_policy = Some(SecurityPolicy {
                    rotation_time_hours: u16::from_be_bytes([value[0], value[1]]),
                    flags: value[2..].to_vec(),
                });
            }
            TlvType::ActiveTimestamp => self.active_timestamp = Some(Timestamp::decode(value)?),
            TlvType::PendingTimestamp => self.pending_timestamp = Some(Timestamp::decode(value)?),
            TlvType::DelayTimer => {
                self.delay_timer_ms = Some(u32::from_be_bytes(fixed("delay timer", value)?));
            }
            TlvType::ChannelMask => self.channel_mask = Some(decode_channel_mask(value)?),
        }
        Ok(())
    }

    /// Encodes the dataset as MeshCoP TLVs.
    pub fn to_tlvs(&self) -> Result<DatasetTlvs, DatasetError> {
        let mut out = Vec::with_capacity(128);

        if let Some(ts) = &self.active_timestamp {
            push_tlv(&mut out, TlvType::ActiveTimestamp as u8, &ts.encode());
        }
        if let Some(ts) = &self.pending_timestamp {
            push_tlv(&mut out, TlvType::PendingTimestamp as u8, &ts.encode());
        }
        if let Some(delay) = self.delay_timer_ms {
            push_tlv(&mut out, TlvType::DelayTimer as u8, &delay.to_be_bytes());
        }
        if let Some(channel) = self.channel {
            let ch = channel.to_be_bytes();
            push_tlv(&mut out, TlvType::Channel as u8, &[self.channel_page, ch[0], ch[1]]);
        }
        if let Some(mask) = self.channel_mask {
            let mut value = vec![self.channel_page, 4];
            value.extend_from_slice(&mask.reverse_bits().to_be_bytes());
            push_tlv(&mut out, TlvType::ChannelMask as u8, &value);
        }
        if let Some(xpan) = &self.extended_pan_id {
            push_tlv(&mut out, TlvType::ExtendedPanId as u8, xpan);
        }
        if let Some(prefix) = &self.mesh_local_prefix {
            push_tlv(&mut out, TlvType::MeshLocalPrefix as u8, prefix);
        }
        if let Some(key) = &self.network_key {
            push_tlv(&mut out, TlvType::NetworkKey as u8, key);
        }
        if let Some(name) = &self.network_name {
            if name.is_empty() || name.len() > MAX_NETWORK_NAME_LEN {
                return Err(DatasetError::InvalidValue {
                    tlv: "network name",
                    reason: format!("length {}", name.len()),
                });
            }
            push_tlv(&mut out, TlvType::NetworkName as u8, name.as_bytes());
        }
        if let Some(pan_id) = self.pan_id {
            push_tlv(&mut out, TlvType::PanId as u8, &pan_id.to_be_bytes());
        }
        if let Some(pskc) = &self.pskc {
            push_tlv(&mut out, TlvType::Pskc as u8, pskc);
        }
        if let Some(policy) = &self.security_policy {
            let mut value = policy.rotation_time_hours.to_be_bytes().to_vec();
            value.extend_from_slice(&policy.flags);
            push_tlv(&mut out, TlvType::SecurityPolicy as u8, &value);
        }
        for raw in &self.unknown {
            push_tlv(&mut out, raw.tlv_type, &raw.value);
        }

        DatasetTlvs::from_bytes(out)
    }

    /// One-line description for logs. Keys are never included.
    pub fn summary(&self) -> String {
        format!(
            "ch={}, pan=0x{:04x}, xpan={}, name={}",
            self.channel.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            self.pan_id.unwrap_or(0xffff),
            self.extended_pan_id
                .map(hex::encode)
                .unwrap_or_else(|| "-".into()),
            self.network_name.as_deref().unwrap_or("-"),
        )
    }
}

fn push_tlv(out: &mut Vec<u8>, tlv_type: u8, value: &[u8]) {
    out.push(tlv_type);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Channel mask TLV entries are (page, mask length, mask) with the mask
/// bit-reversed relative to channel numbering. Only page 0 is interpreted.
fn decode_channel_mask(value: &[u8]) -> Result<u32, DatasetError> {
    let mut offset = 0;
    while offset + 2 <= value.len() {
        let page = value[offset];
        let len = value[offset + 1] as usize;
        let start = offset + 2;
        if start + len > value.len() {
            break;
        }
        if page == 0 && len == 4 {
            let raw: [u8; 4] = fixed("channel mask", &value[start..start + 4])?;
            return Ok(u32::from_be_bytes(raw).reverse_bits());
        }
        offset = start + len;
    }
    Err(DatasetError::InvalidValue {
        tlv: "channel mask",
        reason: "no page 0 entry".to_string(),
    })
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NETWORK_NAME_LEN {
        return name;
    }
    let mut end = MAX_NETWORK_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
