//! Command construction and validation on top of the catalog.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::error::GearmanError;

use super::catalog::{self, CommandKind};

/// Which half of the wire handshake a frame belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Magic {
    Request,
    Response,
}

impl Magic {
    pub(crate) fn bytes(self) -> [u8; 4] {
        match self {
            Magic::Request => *b"\x00REQ",
            Magic::Response => *b"\x00RES",
        }
    }

    pub(crate) fn from_bytes(b: [u8; 4]) -> Option<Self> {
        match &b {
            b"\x00REQ" => Some(Magic::Request),
            b"\x00RES" => Some(Magic::Response),
            _ => None,
        }
    }
}

/// A decoded or to-be-encoded Gearman frame: magic, type, and ordered
/// argument values aligned to the type's schema in the catalog.
#[derive(Clone, Eq, PartialEq)]
pub struct Command {
    pub magic: Magic,
    pub kind: &'static CommandKind,
    fields: Vec<Bytes>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Command");
        s.field("magic", &self.magic).field("name", &self.kind.name);
        for (spec, value) in self.kind.fields.iter().zip(&self.fields) {
            if spec.is_data {
                s.field(spec.name, &format_args!("{} bytes", value.len()));
            } else {
                s.field(spec.name, &String::from_utf8_lossy(value));
            }
        }
        s.finish()
    }
}

impl Command {
    /// Constructs a command for `kind_name`, validating that `args` supplies
    /// exactly the fields the catalog schema requires, in any order, with
    /// no unknown fields. Distinguishes an unrecognized type name from a
    /// field mismatch.
    pub fn create(
        kind_name: &str,
        magic: Magic,
        mut args: BTreeMap<&str, Bytes>,
    ) -> Result<Command, GearmanError> {
        let kind = catalog::by_name(kind_name)
            .ok_or_else(|| GearmanError::UnknownCommand(kind_name.to_string()))?;

        let mut fields = Vec::with_capacity(kind.fields.len());
        for spec in kind.fields {
            let value = args.remove(spec.name).ok_or_else(|| GearmanError::ArgumentMismatch {
                command: kind.name,
                detail: format!("missing field {:?}", spec.name),
            })?;
            fields.push(value);
        }
        if let Some(extra) = args.keys().next() {
            return Err(GearmanError::ArgumentMismatch {
                command: kind.name,
                detail: format!("unknown field {extra:?}"),
            });
        }

        Ok(Command { magic, kind, fields })
    }

    /// Builds a command from raw decoded field bytes, bypassing name-based
    /// argument validation (the decoder already knows the field count is
    /// correct for `kind`).
    pub(crate) fn from_decoded(magic: Magic, kind: &'static CommandKind, fields: Vec<Bytes>) -> Self {
        debug_assert_eq!(fields.len(), kind.fields.len());
        Command { magic, kind, fields }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name
    }

    /// Returns the value of a named field, or `None` if the field does not
    /// exist on this command's type.
    pub fn field(&self, name: &str) -> Option<&Bytes> {
        let idx = self.kind.fields.iter().position(|f| f.name == name)?;
        self.fields.get(idx)
    }

    pub fn field_str(&self, name: &str) -> Option<String> {
        self.field(name).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub(crate) fn ordered_fields(&self) -> &[Bytes] {
        &self.fields
    }
}

/// Convenience builder for request commands with string-ish field values;
/// panics if a required field is a data field that must hold non-UTF8
/// bytes and is passed as something that can't convert. Callers building
/// requests internally always supply [`Bytes`] explicitly for data fields.
pub(crate) fn request(kind_name: &'static str, args: &[(&str, Bytes)]) -> Command {
    let map: BTreeMap<&str, Bytes> = args.iter().map(|(k, v)| (*k, v.clone())).collect();
    Command::create(kind_name, Magic::Request, map)
        .unwrap_or_else(|e| panic!("internal request builder for {kind_name} is broken: {e}"))
}

pub(crate) fn s(value: impl Into<String>) -> Bytes {
    Bytes::from(value.into())
}
