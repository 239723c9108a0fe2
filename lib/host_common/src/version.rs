//!
//! @file version.rs
//! @brief Packed host version identifier and the known release constants.
//! @bug No known bugs.
//!
//! The version of the running host executable is resolved by an external
//! signature scanner; everything in this workspace only ever consumes the
//! value it hands over. The packing matches the layout the host embeds in
//! its own resources, so the resolver can pass its result through raw.
//!

use std::num::NonZeroU32;
use std::fmt::{Display, Debug, Formatter, Error};
use std::str::FromStr;

/// Wraps a packed host version.
#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RuntimeVersion(NonZeroU32);

/// The error returned when a version string cannot be parsed.
#[derive(Copy, Clone, Debug)]
pub struct ParseVersionError;

pub const VARIANT_RETAIL: u32 = 0;
pub const VARIANT_GOG: u32 = 1;
pub const VARIANT_EPIC: u32 = 2;

pub const RUNTIME_VERSION_1_5_73: RuntimeVersion =
    RuntimeVersion::new(1, 5, 73, VARIANT_RETAIL);
pub const RUNTIME_VERSION_1_6_438: RuntimeVersion =
    RuntimeVersion::new(1, 6, 438, VARIANT_RETAIL);
pub const RUNTIME_VERSION_1_6_1130: RuntimeVersion =
    RuntimeVersion::new(1, 6, 1130, VARIANT_RETAIL);

impl RuntimeVersion {
    pub const fn new(
        major: u32,
        minor: u32,
        build: u32,
        variant: u32
    ) -> Self {
        Self::from_raw(
            (major << 24) |
            (minor << 16) |
            ((build & 0xFFF) << 4) |
            (variant & 0xF)
        )
    }

    /// Converts a raw u32, as the version resolver reports it, to a version.
    pub const fn from_raw(
        v: u32
    ) -> Self {
        if let Some(v) = NonZeroU32::new(v) {
            Self(v)
        } else {
            panic!("Cannot create version 0.0.0.0!");
        }
    }

    /// Gets the packed representation, as persisted in the database file.
    pub const fn raw(
        &self
    ) -> u32 {
        self.0.get()
    }

    /// Gets the versions major revision.
    pub const fn major(
        &self
    ) -> u32 {
        self.0.get() >> 24
    }

    /// Gets the versions minor revision.
    pub const fn minor(
        &self
    ) -> u32 {
        (self.0.get() >> 16) & 0xFF
    }

    /// Gets the versions build number.
    pub const fn build(
        &self
    ) -> u32 {
        (self.0.get() >> 4) & 0xFFF
    }

    /// Gets the store variant the host was obtained from.
    pub const fn variant(
        &self
    ) -> u32 {
        self.0.get() & 0xF
    }
}

impl Display for RuntimeVersion {
    fn fmt(
        &self,
        f: &mut Formatter<'_>
    ) -> Result<(), Error> {
        write!(f, "{}.{}.{}.{}", self.major(), self.minor(), self.build(), self.variant())
    }
}

impl Debug for RuntimeVersion {
    fn fmt(
        &self,
        f: &mut Formatter<'_>
    ) -> Result<(), Error> {
        Display::fmt(self, f)
    }
}

impl FromStr for RuntimeVersion {
    type Err = ParseVersionError;

    /// Parses "major.minor.build" with an optional trailing ".variant".
    fn from_str(
        s: &str
    ) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = || -> Result<u32, ParseVersionError> {
            parts.next().ok_or(ParseVersionError)?.parse().map_err(|_| ParseVersionError)
        };

        let (major, minor, build) = (next()?, next()?, next()?);
        let variant = match parts.next() {
            Some(v) => v.parse().map_err(|_| ParseVersionError)?,
            None => VARIANT_RETAIL
        };

        if parts.next().is_some() || major > 0xFF || minor > 0xFF || build > 0xFFF || variant > 0xF {
            return Err(ParseVersionError);
        }

        Ok(Self::new(major, minor, build, variant))
    }
}

impl Display for ParseVersionError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>
    ) -> Result<(), Error> {
        write!(f, "expected a version of the form \"major.minor.build[.variant]\"")
    }
}

impl std::error::Error for ParseVersionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_fields() {
        let v = RuntimeVersion::new(1, 6, 1130, VARIANT_GOG);
        assert_eq!(v.major(), 1);
        assert_eq!(v.minor(), 6);
        assert_eq!(v.build(), 1130);
        assert_eq!(v.variant(), VARIANT_GOG);
        assert_eq!(RuntimeVersion::from_raw(v.raw()), v);
    }

    #[test]
    fn orders_by_release() {
        assert!(RUNTIME_VERSION_1_5_73 < RUNTIME_VERSION_1_6_438);
        assert!(RUNTIME_VERSION_1_6_438 < RUNTIME_VERSION_1_6_1130);
    }

    #[test]
    fn parses_display_form() {
        let v: RuntimeVersion = "1.6.438.0".parse().unwrap();
        assert_eq!(v, RUNTIME_VERSION_1_6_438);
        assert_eq!("1.6.438".parse::<RuntimeVersion>().unwrap(), v);
        assert!("1.6".parse::<RuntimeVersion>().is_err());
        assert!("1.6.438.0.9".parse::<RuntimeVersion>().is_err());
        assert_eq!(v.to_string(), "1.6.438.0");
    }
}
