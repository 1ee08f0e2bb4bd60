// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PermissionsError {
    #[error("Invalid permissions {0:?}, expected three octal digits")]
    Malformed(String),
}

/// The use/manage/admin access bits of one ACL class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessBits {
    pub use_: bool,
    pub manage: bool,
    pub admin: bool,
}

impl AccessBits {
    fn octal(&self) -> u8 {
        (self.use_ as u8) * 4 + (self.manage as u8) * 2 + self.admin as u8
    }
}

/// Owner/group/other permissions, rendered as three octal digits ("640").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Permissions {
    owner: u8,
    group: u8,
    other: u8,
}

impl Permissions {
    pub fn from_bits(
        owner: AccessBits,
        group: AccessBits,
        other: AccessBits,
    ) -> Self {
        Self { owner: owner.octal(), group: group.octal(), other: other.octal() }
    }

    #[inline]
    pub fn owner(&self) -> u8 {
        self.owner
    }

    #[inline]
    pub fn group(&self) -> u8 {
        self.group
    }

    #[inline]
    pub fn other(&self) -> u8 {
        self.other
    }
}

impl FromStr for Permissions {
    type Err = PermissionsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .chars()
            .map(|c| c.to_digit(8).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| PermissionsError::Malformed(s.to_string()))?;

        match digits[..] {
            [owner, group, other] => Ok(Self { owner, group, other }),
            _ => Err(PermissionsError::Malformed(s.to_string())),
        }
    }
}

impl Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.owner, self.group, self.other)
    }
}

impl Serialize for Permissions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'d> Deserialize<'d> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_test::{assert_tokens, Token};

    const TEST_CASES: &[(&str, Result<(u8, u8, u8), ()>)] = &[
        ("640", Ok((6, 4, 0))),
        ("777", Ok((7, 7, 7))),
        ("000", Ok((0, 0, 0))),
        ("800", Err(())),
        ("64", Err(())),
        ("6400", Err(())),
        ("rw-", Err(())),
        ("", Err(())),
    ];

    #[test]
    fn permissions_from_str() {
        for (input, expected) in TEST_CASES {
            match Permissions::from_str(input) {
                Ok(perms) => {
                    let (owner, group, other) = expected.unwrap();
                    assert_eq!(perms.owner(), owner);
                    assert_eq!(perms.group(), group);
                    assert_eq!(perms.other(), other);
                    assert_eq!(&perms.to_string(), input);
                }
                Err(_) => assert!(
                    expected.is_err(),
                    "Expected error parsing permissions {}",
                    input
                ),
            }
        }
    }

    #[test]
    fn permissions_serialization() {
        for (input, expected) in TEST_CASES {
            match expected {
                Ok(_) => {
                    let perms = Permissions::from_str(input).unwrap();
                    assert_tokens(&perms, &[Token::Str(input)]);
                }
                Err(_) => {
                    let tokens = [Token::Str(input)];
                    let mut de = serde_test::Deserializer::new(&tokens);
                    assert!(Permissions::deserialize(&mut de).is_err());
                }
            }
        }
    }

    #[test]
    fn permissions_from_bits() {
        let owner = AccessBits { use_: true, manage: true, admin: false };
        let group = AccessBits { use_: true, ..Default::default() };
        let other = AccessBits::default();
        let perms = Permissions::from_bits(owner, group, other);
        assert_eq!(perms.to_string(), "640");

        let all = AccessBits { use_: true, manage: true, admin: true };
        assert_eq!(Permissions::from_bits(all, all, all).to_string(), "777");
    }
}
