//! The static command catalog: name, code, and ordered argument schema
//! for every command type the protocol defines.
//!
//! This is the single source of truth the codec and the command factory
//! (`Command::create`) both consult. Every command this crate emits or
//! accepts is looked up here; an unrecognized code on the wire is a
//! protocol error, and an unrecognized name at construction time is a
//! programmer error.

/// One named field in a command's payload. Only the last field of a type
/// may be the "data" field, opaque bytes that may be empty or contain NUL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub is_data: bool,
}

const fn field(name: &'static str) -> FieldSpec {
    FieldSpec { name, is_data: false }
}

const fn data_field(name: &'static str) -> FieldSpec {
    FieldSpec { name, is_data: true }
}

/// A command type: its wire code, name, and ordered field schema.
#[derive(Debug, Eq, PartialEq)]
pub struct CommandKind {
    pub code: u32,
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

macro_rules! kind {
    ($code:expr, $name:expr $(, $field:expr)* $(,)?) => {
        CommandKind { code: $code, name: $name, fields: &[$($field),*] }
    };
}

/// The full catalog, in wire-code order. Codes and field layouts follow the
/// Gearman protocol as implemented by `gearmand`.
pub static CATALOG: &[CommandKind] = &[
    kind!(1, "CAN_DO", field("function_name")),
    kind!(2, "CANT_DO", field("function_name")),
    kind!(3, "RESET_ABILITIES"),
    kind!(4, "PRE_SLEEP"),
    kind!(6, "NOOP"),
    kind!(7, "SUBMIT_JOB", field("function_name"), field("id"), data_field("data")),
    kind!(8, "JOB_CREATED", field("handle")),
    kind!(9, "GRAB_JOB"),
    kind!(10, "NO_JOB"),
    kind!(11, "JOB_ASSIGN", field("handle"), field("function_name"), data_field("data")),
    kind!(12, "WORK_STATUS", field("handle"), field("numerator"), field("denominator")),
    kind!(13, "WORK_COMPLETE", field("handle"), data_field("data")),
    kind!(14, "WORK_FAIL", field("handle")),
    kind!(15, "GET_STATUS", field("handle")),
    kind!(16, "ECHO_REQ", data_field("data")),
    kind!(17, "ECHO_RES", data_field("data")),
    kind!(18, "SUBMIT_JOB_BG", field("function_name"), field("id"), data_field("data")),
    kind!(19, "ERROR", field("code"), data_field("text")),
    kind!(
        20,
        "STATUS_RES",
        field("handle"),
        field("known"),
        field("running"),
        field("numerator"),
        field("denominator"),
    ),
    kind!(21, "SUBMIT_JOB_HIGH", field("function_name"), field("id"), data_field("data")),
    kind!(22, "SET_CLIENT_ID", field("client_id")),
    kind!(23, "CAN_DO_TIMEOUT", field("function_name"), field("timeout")),
    kind!(24, "ALL_YOURS"),
    kind!(25, "WORK_EXCEPTION", field("handle"), data_field("data")),
    kind!(26, "OPTION_REQ", field("option_name")),
    kind!(27, "OPTION_RES", field("option_name")),
    kind!(28, "WORK_DATA", field("handle"), data_field("data")),
    kind!(29, "WORK_WARNING", field("handle"), data_field("data")),
    kind!(30, "GRAB_JOB_UNIQ"),
    kind!(
        31,
        "JOB_ASSIGN_UNIQ",
        field("handle"),
        field("function_name"),
        field("unique_id"),
        data_field("data"),
    ),
    kind!(32, "SUBMIT_JOB_HIGH_BG", field("function_name"), field("id"), data_field("data")),
    kind!(33, "SUBMIT_JOB_LOW", field("function_name"), field("id"), data_field("data")),
    kind!(34, "SUBMIT_JOB_LOW_BG", field("function_name"), field("id"), data_field("data")),
    kind!(
        35,
        "SUBMIT_JOB_SCHED",
        field("function_name"),
        field("id"),
        field("minute"),
        field("hour"),
        field("day"),
        field("month"),
        field("dow"),
        data_field("data"),
    ),
    kind!(
        36,
        "SUBMIT_JOB_EPOCH",
        field("function_name"),
        field("id"),
        field("epoch"),
        data_field("data"),
    ),
];

pub fn by_name(name: &str) -> Option<&'static CommandKind> {
    CATALOG.iter().find(|k| k.name == name)
}

pub fn by_code(code: u32) -> Option<&'static CommandKind> {
    CATALOG.iter().find(|k| k.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_codes_are_unique() {
        let mut names: Vec<_> = CATALOG.iter().map(|k| k.name).collect();
        let mut codes: Vec<_> = CATALOG.iter().map(|k| k.code).collect();
        names.sort_unstable();
        codes.sort_unstable();
        let n = names.len();
        names.dedup();
        codes.dedup();
        assert_eq!(names.len(), n, "duplicate command name in catalog");
        assert_eq!(codes.len(), n, "duplicate command code in catalog");
    }

    #[test]
    fn only_the_last_field_may_be_a_data_field() {
        for kind in CATALOG {
            for (i, f) in kind.fields.iter().enumerate() {
                if f.is_data {
                    assert_eq!(i, kind.fields.len() - 1, "{}: data field not last", kind.name);
                }
            }
        }
    }

    #[test]
    fn lookup_roundtrips() {
        let submit = by_name("SUBMIT_JOB").expect("SUBMIT_JOB in catalog");
        assert_eq!(by_code(submit.code).unwrap().name, "SUBMIT_JOB");
    }
}
