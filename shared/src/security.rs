/*!
 * shared/src/security.rs
 *
 * Security-information mask, SIDs and a builder for self-relative
 * security descriptors.
 *
 * The mask is opaque to the bridge: it is forwarded to the service and
 * printed in diagnostics, never used to decide an outcome.
 */

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::constants::SECURITY_DESCRIPTOR_MIN_LEN;

/*────────── SECURITY_INFORMATION ─────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityInformation(pub u32);

impl SecurityInformation {
    pub const OWNER: Self = Self(0x0000_0001);
    pub const GROUP: Self = Self(0x0000_0002);
    pub const DACL: Self = Self(0x0000_0004);
    pub const SACL: Self = Self(0x0000_0008);
    pub const LABEL: Self = Self(0x0000_0010);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::OWNER, "OWNER"),
        (Self::GROUP, "GROUP"),
        (Self::DACL, "DACL"),
        (Self::SACL, "SACL"),
        (Self::LABEL, "LABEL"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for SecurityInformation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// `OWNER|DACL`, with unknown bits appended in hex.
impl fmt::Display for SecurityInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                rest &= !flag.0;
                first = false;
            }
        }
        if rest != 0 || first {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "0x{rest:X}")?;
        }
        Ok(())
    }
}

/*────────── SID ─────────*/

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SidError {
    #[error("SID must start with 'S-1-': {0}")]
    Prefix(String),
    #[error("invalid SID component '{0}'")]
    Component(String),
    #[error("SID has {0} sub-authorities (max 15)")]
    TooManySubAuthorities(usize),
}

/// Binary SID: revision 1, 48-bit authority, up to 15 sub-authorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    pub const MAX_SUB_AUTHORITIES: usize = 15;

    pub fn len(&self) -> usize {
        8 + 4 * self.sub_authorities.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.push(1);
        out.push(self.sub_authorities.len() as u8);
        // authority is big-endian in 6 bytes
        out.extend_from_slice(&self.authority.to_be_bytes()[2..]);
        for sub in &self.sub_authorities {
            out.extend_from_slice(&sub.to_le_bytes());
        }
        out
    }
}

impl FromStr for Sid {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("S-1-")
            .ok_or_else(|| SidError::Prefix(s.to_owned()))?;
        let mut parts = rest.split('-');
        let authority = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .filter(|a| *a < (1 << 48))
            .ok_or_else(|| SidError::Component(rest.to_owned()))?;
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| SidError::Component(p.to_owned())))
            .collect::<Result<Vec<_>, _>>()?;
        if sub_authorities.len() > Self::MAX_SUB_AUTHORITIES {
            return Err(SidError::TooManySubAuthorities(sub_authorities.len()));
        }
        Ok(Self { authority, sub_authorities })
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-1-{}", self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

/*────────── self-relative SECURITY_DESCRIPTOR ─────────*/

const SECURITY_DESCRIPTOR_REVISION: u8 = 1;
const SE_SELF_RELATIVE: u16 = 0x8000;

/// Builds the byte image returned by a query-security request.
///
/// Only owner and group are materialised; ACL contents belong to the
/// access-control subsystem and are left absent.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    owner: Option<Sid>,
    group: Option<Sid>,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, sid: Sid) -> Self {
        self.owner = Some(sid);
        self
    }

    pub fn group(mut self, sid: Sid) -> Self {
        self.group = Some(sid);
        self
    }

    /// Header-only descriptor (`SECURITY_DESCRIPTOR_MIN_LEN` bytes).
    pub fn minimal() -> Vec<u8> {
        Self::new().build(SecurityInformation::default())
    }

    /// Length `build(info)` would produce, without allocating the image.
    pub fn length(&self, info: SecurityInformation) -> usize {
        SECURITY_DESCRIPTOR_MIN_LEN
            + self.selected_owner(info).map_or(0, Sid::len)
            + self.selected_group(info).map_or(0, Sid::len)
    }

    pub fn build(&self, info: SecurityInformation) -> Vec<u8> {
        let owner = self.selected_owner(info).map(Sid::to_bytes);
        let group = self.selected_group(info).map(Sid::to_bytes);

        let mut offset = SECURITY_DESCRIPTOR_MIN_LEN as u32;
        let mut place = |bytes: &Option<Vec<u8>>| match bytes {
            Some(b) => {
                let at = offset;
                offset += b.len() as u32;
                at
            }
            None => 0,
        };
        let owner_off = place(&owner);
        let group_off = place(&group);

        let mut out = Vec::with_capacity(self.length(info));
        out.push(SECURITY_DESCRIPTOR_REVISION);
        out.push(0); // Sbz1
        out.extend_from_slice(&SE_SELF_RELATIVE.to_le_bytes());
        out.extend_from_slice(&owner_off.to_le_bytes());
        out.extend_from_slice(&group_off.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // Sacl
        out.extend_from_slice(&0u32.to_le_bytes()); // Dacl
        out.extend(owner.into_iter().flatten());
        out.extend(group.into_iter().flatten());
        out
    }

    fn selected_owner(&self, info: SecurityInformation) -> Option<&Sid> {
        self.owner.as_ref().filter(|_| info.contains(SecurityInformation::OWNER))
    }

    fn selected_group(&self, info: SecurityInformation) -> Option<&Sid> {
        self.group.as_ref().filter(|_| info.contains(SecurityInformation::GROUP))
    }
}
