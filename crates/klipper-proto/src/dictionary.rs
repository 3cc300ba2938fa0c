//! The data dictionary: a JSON description of every registered command,
//! response, constant, and enumeration, zlib-wrapped for transmission via
//! `identify`/`identify_response` chunks.
//!
//! Only available with the `std` feature, since building it needs an
//! allocator. The core itself only ever calls [`build`] once, at the end of
//! its init phase, and caches the result.

#![cfg(feature = "std")]

use std::fmt::Write as _;

/// A dictionary `config` constant: Klipper serializes all values, signed or
/// unsigned, as decimal strings.
#[derive(Debug, Clone, Copy)]
pub enum ConstantValue {
    Signed(i64),
    Unsigned(u64),
}

impl ConstantValue {
    fn to_decimal_string(self) -> String {
        match self {
            ConstantValue::Signed(v) => v.to_string(),
            ConstantValue::Unsigned(v) => v.to_string(),
        }
    }
}

/// One `name format` entry in the `commands` or `responses` map, already
/// carrying the id the registry assigned it.
#[derive(Debug, Clone, Copy)]
pub struct IdentifiedDescriptor<'a> {
    pub id: u16,
    pub name: &'a str,
    pub format: &'a str,
}

/// Everything [`build`] needs to render the document described in spec §6.
pub struct DictionaryInput<'a> {
    pub version: &'a str,
    pub build_versions: &'a str,
    pub constants: &'a [(&'a str, ConstantValue)],
    pub commands: &'a [IdentifiedDescriptor<'a>],
    pub responses: &'a [IdentifiedDescriptor<'a>],
    /// `(enum_name, [(entry_name, index)])`. Pass an empty slice to omit the
    /// `"enumerations"` key entirely (spec.md §9's resolved open question).
    pub enumerations: &'a [(&'a str, &'a [(&'a str, u32)])],
}

fn json_escape(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_descriptor_map(out: &mut String, entries: &[IdentifiedDescriptor]) {
    out.push('{');
    let mut sorted: Vec<&IdentifiedDescriptor> = entries.iter().collect();
    sorted.sort_by_key(|e| e.id);
    for (i, e) in sorted.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let key = if e.format.is_empty() {
            e.name.to_string()
        } else {
            format!("{} {}", e.name, e.format)
        };
        json_escape(&key, out);
        out.push(':');
        let _ = write!(out, "{}", e.id);
    }
    out.push('}');
}

/// Renders the dictionary document as sorted, deterministic JSON text.
///
/// Key ordering follows spec.md §6 exactly: `config` entries sorted by
/// constant name, `commands`/`responses` sorted by id (not by the
/// `"name format"` string), `enumerations` entries in the order given and
/// omitted entirely when empty.
pub fn build_json(input: &DictionaryInput) -> String {
    let mut out = String::new();
    out.push('{');

    out.push_str("\"version\":");
    json_escape(input.version, &mut out);
    out.push(',');

    out.push_str("\"build_versions\":");
    json_escape(input.build_versions, &mut out);
    out.push(',');

    out.push_str("\"config\":{");
    let mut constants: Vec<&(&str, ConstantValue)> = input.constants.iter().collect();
    constants.sort_by_key(|(name, _)| *name);
    for (i, (name, value)) in constants.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        json_escape(name, &mut out);
        out.push(':');
        json_escape(&value.to_decimal_string(), &mut out);
    }
    out.push_str("},");

    out.push_str("\"commands\":");
    write_descriptor_map(&mut out, input.commands);
    out.push(',');

    out.push_str("\"responses\":");
    write_descriptor_map(&mut out, input.responses);

    if !input.enumerations.is_empty() {
        out.push_str(",\"enumerations\":{");
        for (i, (name, entries)) in input.enumerations.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            json_escape(name, &mut out);
            out.push_str(":{");
            for (j, (entry, index)) in entries.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                json_escape(entry, &mut out);
                out.push(':');
                let _ = write!(out, "{}", index);
            }
            out.push('}');
        }
        out.push('}');
    }

    out.push('}');
    out
}

const ADLER_MOD: u32 = 65521;

fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % ADLER_MOD;
        b = (b + a) % ADLER_MOD;
    }
    (b << 16) | a
}

/// zlib-wraps `data` using uncompressed DEFLATE stored blocks (legal per
/// RFC 1950/1951, and explicitly permitted by spec.md §6).
pub fn zlib_wrap(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.push(0x78); // CMF: CM=8 (deflate), CINFO=7 (32K window)
    out.push(0x01); // FLG: FCHECK makes (CMF*256+FLG) a multiple of 31, FLEVEL=fastest

    const MAX_STORED_BLOCK: usize = 65535;
    if data.is_empty() {
        out.push(0x01); // BFINAL=1, BTYPE=00 (stored), one empty final block
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0xffffu16.to_le_bytes());
    } else {
        let mut chunks = data.chunks(MAX_STORED_BLOCK).peekable();
        while let Some(chunk) = chunks.next() {
            let is_final = chunks.peek().is_none();
            out.push(if is_final { 0x01 } else { 0x00 });
            let len = chunk.len() as u16;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&(!len).to_le_bytes());
            out.extend_from_slice(chunk);
        }
    }

    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

/// Builds the full document and zlib-wraps it, matching
/// [`build_json`] followed by [`zlib_wrap`].
pub fn build(input: &DictionaryInput) -> Vec<u8> {
    zlib_wrap(build_json(input).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> (Vec<(&'static str, ConstantValue)>, Vec<IdentifiedDescriptor<'static>>) {
        let constants = vec![
            ("CLOCK_FREQ", ConstantValue::Unsigned(12_000_000)),
            ("ADC_MAX", ConstantValue::Unsigned(4095)),
        ];
        let commands = vec![
            IdentifiedDescriptor { id: 1, name: "identify", format: "offset=%u count=%c" },
            IdentifiedDescriptor { id: 2, name: "get_clock", format: "" },
        ];
        (constants, commands)
    }

    #[test]
    fn config_keys_are_sorted_alphabetically() {
        let (constants, commands) = sample_input();
        let input = DictionaryInput {
            version: "v1",
            build_versions: "test",
            constants: &constants,
            commands: &commands,
            responses: &[],
            enumerations: &[],
        };
        let json = build_json(&input);
        let adc_pos = json.find("ADC_MAX").unwrap();
        let clock_pos = json.find("CLOCK_FREQ").unwrap();
        assert!(adc_pos < clock_pos);
    }

    #[test]
    fn commands_are_ordered_by_id_not_name() {
        let (constants, commands) = sample_input();
        let input = DictionaryInput {
            version: "v1",
            build_versions: "test",
            constants: &constants,
            commands: &commands,
            responses: &[],
            enumerations: &[],
        };
        let json = build_json(&input);
        let identify_pos = json.find("identify offset").unwrap();
        let clock_pos = json.find("get_clock").unwrap();
        assert!(identify_pos < clock_pos);
    }

    #[test]
    fn enumerations_key_omitted_when_empty() {
        let (constants, commands) = sample_input();
        let input = DictionaryInput {
            version: "v1",
            build_versions: "test",
            constants: &constants,
            commands: &commands,
            responses: &[],
            enumerations: &[],
        };
        let json = build_json(&input);
        assert!(!json.contains("enumerations"));
    }

    #[test]
    fn enumerations_key_present_when_non_empty() {
        let (constants, commands) = sample_input();
        let pins = [("PA0", 0u32), ("PA1", 1u32)];
        let enumerations = [("pin", &pins[..])];
        let input = DictionaryInput {
            version: "v1",
            build_versions: "test",
            constants: &constants,
            commands: &commands,
            responses: &[],
            enumerations: &enumerations,
        };
        let json = build_json(&input);
        assert!(json.contains("\"enumerations\":{\"pin\":{\"PA0\":0,\"PA1\":1}}"));
    }

    #[test]
    fn build_is_idempotent() {
        let (constants, commands) = sample_input();
        let input = DictionaryInput {
            version: "v1",
            build_versions: "test",
            constants: &constants,
            commands: &commands,
            responses: &[],
            enumerations: &[],
        };
        let a = build(&input);
        let b = build(&input);
        assert_eq!(a, b);
    }

    #[test]
    fn zlib_stored_blocks_round_trip_through_a_hand_rolled_inflate() {
        let data = b"hello klipper dictionary";
        let wrapped = zlib_wrap(data);
        assert_eq!(&wrapped[..2], &[0x78, 0x01]);
        // walk the single stored block back out by hand (no decoder crate
        // in this dependency-constrained workspace).
        let block = &wrapped[2..];
        assert_eq!(block[0], 0x01); // BFINAL=1, BTYPE=stored
        let len = u16::from_le_bytes([block[1], block[2]]) as usize;
        let nlen = u16::from_le_bytes([block[3], block[4]]);
        assert_eq!(nlen, !(len as u16));
        let payload = &block[5..5 + len];
        assert_eq!(payload, data);
        let adler_bytes = &wrapped[wrapped.len() - 4..];
        assert_eq!(u32::from_be_bytes(adler_bytes.try_into().unwrap()), adler32(data));
    }

    #[test]
    fn empty_input_wraps_to_a_valid_empty_zlib_stream() {
        let wrapped = zlib_wrap(&[]);
        assert_eq!(&wrapped[..2], &[0x78, 0x01]);
        assert_eq!(wrapped.len(), 2 + 5 + 4);
    }
}
