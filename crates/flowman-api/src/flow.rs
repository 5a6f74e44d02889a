// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow keys, exact and wildcard matches, and datapath actions.
//!
//! A [`FlowKey`] is one attribute of a packet as seen by the
//! datapath, along with its value. An [`ExactMatch`] carries a value
//! for every attribute the datapath extracted from a packet, while a
//! [`WildcardMatch`] only constrains the attributes it holds. The set
//! of [`AttrKind`]s a wildcard match constrains is its [`Pattern`].

use super::ip::Ipv4Addr;
use super::mac::MacAddr;
use alloc::collections::BTreeMap;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// The kind of a matchable attribute, independent of its value.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum AttrKind {
    InPort,
    EtherSrc,
    EtherDst,
    EtherType,
    VlanId,
    Ip4Src,
    Ip4Dst,
    IpProto,
    IpTos,
    L4Src,
    L4Dst,
    TunnelId,
}

impl AttrKind {
    pub const ALL: [AttrKind; 12] = [
        Self::InPort,
        Self::EtherSrc,
        Self::EtherDst,
        Self::EtherType,
        Self::VlanId,
        Self::Ip4Src,
        Self::Ip4Dst,
        Self::IpProto,
        Self::IpTos,
        Self::L4Src,
        Self::L4Dst,
        Self::TunnelId,
    ];

    /// The name used for this kind in the textual form of a key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InPort => "in_port",
            Self::EtherSrc => "ether_src",
            Self::EtherDst => "ether_dst",
            Self::EtherType => "ether_type",
            Self::VlanId => "vlan",
            Self::Ip4Src => "ip4_src",
            Self::Ip4Dst => "ip4_dst",
            Self::IpProto => "ip_proto",
            Self::IpTos => "ip_tos",
            Self::L4Src => "l4_src",
            Self::L4Dst => "l4_dst",
            Self::TunnelId => "tunnel_id",
        }
    }
}

impl FromStr for AttrKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|k| k.name() == lower)
            .copied()
            .ok_or_else(|| format!("unknown attribute: {s}"))
    }
}

impl Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed attribute/value pair.
///
/// The derived ordering sorts by kind first, then by value.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum FlowKey {
    InPort(u32),
    EtherSrc(MacAddr),
    EtherDst(MacAddr),
    EtherType(u16),
    VlanId(u16),
    Ip4Src(Ipv4Addr),
    Ip4Dst(Ipv4Addr),
    IpProto(u8),
    IpTos(u8),
    L4Src(u16),
    L4Dst(u16),
    TunnelId(u64),
}

impl FlowKey {
    pub fn kind(&self) -> AttrKind {
        match self {
            Self::InPort(_) => AttrKind::InPort,
            Self::EtherSrc(_) => AttrKind::EtherSrc,
            Self::EtherDst(_) => AttrKind::EtherDst,
            Self::EtherType(_) => AttrKind::EtherType,
            Self::VlanId(_) => AttrKind::VlanId,
            Self::Ip4Src(_) => AttrKind::Ip4Src,
            Self::Ip4Dst(_) => AttrKind::Ip4Dst,
            Self::IpProto(_) => AttrKind::IpProto,
            Self::IpTos(_) => AttrKind::IpTos,
            Self::L4Src(_) => AttrKind::L4Src,
            Self::L4Dst(_) => AttrKind::L4Dst,
            Self::TunnelId(_) => AttrKind::TunnelId,
        }
    }
}

/// Parse an unsigned integer, accepting a `0x` prefix for hex.
fn parse_uint<T: TryFrom<u64>>(s: &str) -> Result<T, String> {
    let val = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
    .map_err(|e| format!("bad number {s}: {e}"))?;

    T::try_from(val).map_err(|_| format!("value out of range: {s}"))
}

impl FromStr for FlowKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, val) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <attr>=<value>: {s}"))?;
        let val = val.trim();

        match kind.trim().parse::<AttrKind>()? {
            AttrKind::InPort => Ok(Self::InPort(parse_uint(val)?)),
            AttrKind::EtherSrc => Ok(Self::EtherSrc(val.parse()?)),
            AttrKind::EtherDst => Ok(Self::EtherDst(val.parse()?)),
            AttrKind::EtherType => Ok(Self::EtherType(parse_uint(val)?)),
            AttrKind::VlanId => Ok(Self::VlanId(parse_uint(val)?)),
            AttrKind::Ip4Src => Ok(Self::Ip4Src(val.parse()?)),
            AttrKind::Ip4Dst => Ok(Self::Ip4Dst(val.parse()?)),
            AttrKind::IpProto => Ok(Self::IpProto(parse_uint(val)?)),
            AttrKind::IpTos => Ok(Self::IpTos(parse_uint(val)?)),
            AttrKind::L4Src => Ok(Self::L4Src(parse_uint(val)?)),
            AttrKind::L4Dst => Ok(Self::L4Dst(parse_uint(val)?)),
            AttrKind::TunnelId => Ok(Self::TunnelId(parse_uint(val)?)),
        }
    }
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = self.kind();
        match self {
            Self::InPort(v) => write!(f, "{kind}={v}"),
            Self::EtherSrc(mac) | Self::EtherDst(mac) => {
                write!(f, "{kind}={mac}")
            }
            Self::EtherType(v) => write!(f, "{kind}=0x{v:04X}"),
            Self::VlanId(v) | Self::L4Src(v) | Self::L4Dst(v) => {
                write!(f, "{kind}={v}")
            }
            Self::Ip4Src(ip) | Self::Ip4Dst(ip) => write!(f, "{kind}={ip}"),
            Self::IpProto(v) | Self::IpTos(v) => write!(f, "{kind}={v}"),
            Self::TunnelId(v) => write!(f, "{kind}={v}"),
        }
    }
}

/// The set of [`AttrKind`]s a [`WildcardMatch`] constrains.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Pattern(BTreeSet<AttrKind>);

impl Pattern {
    pub fn contains(&self, kind: AttrKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AttrKind> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<AttrKind> for Pattern {
    fn from_iter<I: IntoIterator<Item = AttrKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }

        let names: Vec<&str> = self.0.iter().map(|k| k.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

// Both match types are a set of keys holding at most one key per
// kind. They differ only in how the engine interprets them.
macro_rules! key_set {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self { keys: BTreeMap::new() }
            }

            /// Add `key`, returning the key of the same kind it
            /// replaced, if any.
            pub fn add_key(&mut self, key: FlowKey) -> Option<FlowKey> {
                self.keys.insert(key.kind(), key)
            }

            pub fn with_key(mut self, key: FlowKey) -> Self {
                self.add_key(key);
                self
            }

            pub fn get(&self, kind: AttrKind) -> Option<&FlowKey> {
                self.keys.get(&kind)
            }

            pub fn keys(&self) -> impl Iterator<Item = &FlowKey> + '_ {
                self.keys.values()
            }

            pub fn kinds(&self) -> impl Iterator<Item = AttrKind> + '_ {
                self.keys.keys().copied()
            }

            pub fn is_empty(&self) -> bool {
                self.keys.is_empty()
            }

            pub fn len(&self) -> usize {
                self.keys.len()
            }
        }

        impl FromIterator<FlowKey> for $name {
            fn from_iter<I: IntoIterator<Item = FlowKey>>(iter: I) -> Self {
                let mut m = Self::new();
                for key in iter {
                    m.add_key(key);
                }
                m
            }
        }

        impl TryFrom<Vec<FlowKey>> for $name {
            type Error = String;

            /// Build a match from `keys`, rejecting a kind given twice.
            fn try_from(keys: Vec<FlowKey>) -> Result<Self, Self::Error> {
                let mut m = Self::new();
                for key in keys {
                    if let Some(prev) = m.add_key(key) {
                        return Err(format!(
                            "{} given more than once: {prev}, {key}",
                            key.kind()
                        ));
                    }
                }
                Ok(m)
            }
        }

        impl From<$name> for Vec<FlowKey> {
            fn from(m: $name) -> Self {
                m.keys.into_values().collect()
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s == "*" {
                    return Ok(Self::new());
                }

                let keys = s
                    .split(',')
                    .map(str::trim)
                    .filter(|tok| !tok.is_empty())
                    .map(FlowKey::from_str)
                    .collect::<Result<Vec<_>, _>>()?;
                Self::try_from(keys)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if self.keys.is_empty() {
                    return write!(f, "*");
                }

                let keys: Vec<String> =
                    self.keys.values().map(ToString::to_string).collect();
                write!(f, "{}", keys.join(","))
            }
        }
    };
}

/// A fully specified set of flow keys, identifying exactly one flow
/// as seen by the datapath.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "Vec<FlowKey>", into = "Vec<FlowKey>")]
pub struct ExactMatch {
    keys: BTreeMap<AttrKind, FlowKey>,
}

key_set!(ExactMatch);

impl ExactMatch {
    /// Project this match onto `pattern`.
    ///
    /// Returns the wildcard match made of this match's keys whose
    /// kind is in `pattern`, or `None` if this match lacks a value for
    /// any kind the pattern requires.
    pub fn project(&self, pattern: &Pattern) -> Option<WildcardMatch> {
        let mut wmatch = WildcardMatch::new();
        for kind in pattern.iter() {
            wmatch.add_key(*self.keys.get(&kind)?);
        }
        Some(wmatch)
    }
}

/// A partially specified set of flow keys. Kinds not present are
/// "don't care".
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "Vec<FlowKey>", into = "Vec<FlowKey>")]
pub struct WildcardMatch {
    keys: BTreeMap<AttrKind, FlowKey>,
}

key_set!(WildcardMatch);

impl WildcardMatch {
    /// The set of kinds this match constrains.
    pub fn pattern(&self) -> Pattern {
        self.kinds().collect()
    }

    /// Does `m` carry every key of this match?
    pub fn matches(&self, m: &ExactMatch) -> bool {
        self.keys.iter().all(|(kind, key)| m.get(*kind) == Some(key))
    }
}

/// A single datapath action.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum FlowAction {
    Output(u32),
    Flood,
    Drop,
    SetEtherSrc(MacAddr),
    SetEtherDst(MacAddr),
    SetTunnelId(u64),
    PushVlan(u16),
    PopVlan,
    Userspace,
}

impl FromStr for FlowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (s, None),
        };

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("output", Some(port)) => Ok(Self::Output(parse_uint(port)?)),
            ("flood", None) => Ok(Self::Flood),
            ("drop", None) => Ok(Self::Drop),
            ("set_ether_src", Some(mac)) => Ok(Self::SetEtherSrc(mac.parse()?)),
            ("set_ether_dst", Some(mac)) => Ok(Self::SetEtherDst(mac.parse()?)),
            ("set_tunnel_id", Some(id)) => {
                Ok(Self::SetTunnelId(parse_uint(id)?))
            }
            ("push_vlan", Some(vid)) => Ok(Self::PushVlan(parse_uint(vid)?)),
            ("pop_vlan", None) => Ok(Self::PopVlan),
            ("userspace", None) => Ok(Self::Userspace),
            _ => Err(format!("bad action: {s}")),
        }
    }
}

impl Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Output(port) => write!(f, "output:{port}"),
            Self::Flood => write!(f, "flood"),
            Self::Drop => write!(f, "drop"),
            Self::SetEtherSrc(mac) => write!(f, "set_ether_src:{mac}"),
            Self::SetEtherDst(mac) => write!(f, "set_ether_dst:{mac}"),
            Self::SetTunnelId(id) => write!(f, "set_tunnel_id:{id}"),
            Self::PushVlan(vid) => write!(f, "push_vlan:{vid}"),
            Self::PopVlan => write!(f, "pop_vlan"),
            Self::Userspace => write!(f, "userspace"),
        }
    }
}

/// The ordered actions of a flow.
///
/// A datapath flow shares the list of the wildcard flow it was
/// derived from.
pub type ActionList = Arc<[FlowAction]>;

/// Format an action list as a comma separated string.
///
/// An empty list prints as `-`. The datapath drops such traffic just
/// as it does for an explicit `drop`, but the two are kept apart in
/// dumps.
pub fn actions_str(actions: &[FlowAction]) -> String {
    if actions.is_empty() {
        return "-".to_string();
    }

    let strs: Vec<String> = actions.iter().map(ToString::to_string).collect();
    strs.join(",")
}

/// The stable identifier of a registered wildcard flow.
///
/// Identifiers are handed out in registration order and are never
/// reused by the same manager.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct WildcardFlowId(pub u64);

impl Display for WildcardFlowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
