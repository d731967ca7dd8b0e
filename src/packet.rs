//! Packet framing.
//!
//! ```text
//! 0x55 0x55 <id> <len> <cmd> [<param>...] <checksum>
//! ```
//!
//! - `len` counts itself, `cmd`, the params and the checksum: `params + 3`
//! - `checksum` is `!(id + len + cmd + sum(params))`, truncated to a byte

use crate::{
    command::{layout_width, value_count, Command, FieldKind, FieldSpec, ResponseShape},
    error::BusError,
    model::ServoId,
};

pub const SYNC: [u8; 2] = [0x55, 0x55];

/// Sync marker, id, length, opcode and checksum.
pub const MIN_FRAME_LEN: usize = 6;

/// Bytes counted by the length field besides the params.
const LEN_OVERHEAD: usize = 3;

/// A decoded packet. `params` holds one value per non-pad field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: ServoId,
    pub command: Command,
    pub params: Vec<i32>,
}

pub fn checksum(id: u8, len: u8, opcode: u8, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(u32::from(id) + u32::from(len) + u32::from(opcode), |acc, &b| acc + u32::from(b));
    !(sum as u8)
}

/// Encode a request from the host.
pub fn encode(id: ServoId, command: Command, params: &[i32]) -> Result<Vec<u8>, BusError> {
    check_target(id, command)?;
    let payload = encode_fields(command, command.request_fields(), params)?;
    Ok(frame(id.0, command.opcode(), &payload))
}

/// Encode the answer a servo gives to a read command.
pub fn encode_response(id: ServoId, command: Command, params: &[i32]) -> Result<Vec<u8>, BusError> {
    let ResponseShape::Data(fields) = command.response() else {
        return Err(BusError::UnsupportedCommand(command));
    };
    id.check_unicast()?;
    let payload = encode_fields(command, fields, params)?;
    Ok(frame(id.0, command.opcode(), &payload))
}

/// Decode and validate one complete frame.
///
/// Checks run in order: sync marker, declared length, checksum, opcode, and
/// finally that the payload fits the command's request or response layout.
pub fn decode(bytes: &[u8]) -> Result<Packet, BusError> {
    if bytes.len() < SYNC.len() || bytes[..SYNC.len()] != SYNC {
        return Err(framing("missing sync marker", bytes));
    }
    if bytes.len() < MIN_FRAME_LEN {
        return Err(framing("frame shorter than minimum", bytes));
    }

    let len = bytes[3];
    if usize::from(len) < LEN_OVERHEAD || bytes.len() != usize::from(len) + 3 {
        return Err(framing(
            &format!("declared length {len} does not match frame of {} bytes", bytes.len()),
            bytes,
        ));
    }

    let (id, opcode) = (bytes[2], bytes[4]);
    let payload = &bytes[5..bytes.len() - 1];
    let actual = bytes[bytes.len() - 1];
    let expected = checksum(id, len, opcode, payload);
    if expected != actual {
        return Err(BusError::ChecksumMismatch { expected, actual, raw: bytes.to_vec() });
    }

    let command = Command::from_opcode(opcode)
        .ok_or_else(|| BusError::UnknownCommand { opcode, raw: bytes.to_vec() })?;

    let fields = match command.response() {
        _ if layout_width(command.request_fields()) == payload.len() => command.request_fields(),
        ResponseShape::Data(fields) if layout_width(fields) == payload.len() => fields,
        _ => {
            return Err(framing(
                &format!("{} payload bytes do not fit {command:?}", payload.len()),
                bytes,
            ))
        }
    };

    Ok(Packet { id: ServoId(id), command, params: decode_fields(fields, payload) })
}

/// Where the next frame sits in a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScan {
    /// `buf[start..end]` holds a whole frame (not yet validated).
    Complete { start: usize, end: usize },
    /// More bytes are needed. The first `skip` bytes precede any sync marker
    /// and can be dropped.
    Incomplete { skip: usize },
}

/// Locate the first frame in `buf`, skipping anything before a sync marker.
pub fn scan_frame(buf: &[u8]) -> FrameScan {
    let Some(start) = buf.windows(2).position(|w| w == SYNC) else {
        // A trailing 0x55 may be the first half of a marker.
        let keep = usize::from(buf.last() == Some(&SYNC[0]));
        return FrameScan::Incomplete { skip: buf.len() - keep };
    };

    let Some(&len) = buf.get(start + 3) else {
        return FrameScan::Incomplete { skip: start };
    };
    if usize::from(len) < LEN_OVERHEAD {
        // Cannot be a frame; hand the header to `decode` so it gets reported.
        return FrameScan::Complete { start, end: start + 4 };
    }

    let end = start + 3 + usize::from(len);
    if buf.len() < end {
        FrameScan::Incomplete { skip: start }
    } else {
        FrameScan::Complete { start, end }
    }
}

fn check_target(id: ServoId, command: Command) -> Result<(), BusError> {
    if id.is_broadcast() && command.allows_broadcast() {
        return Ok(());
    }
    id.check_unicast().map(|_| ())
}

fn frame(id: u8, opcode: u8, payload: &[u8]) -> Vec<u8> {
    // Payload width is bounded by the static layouts, far below 252 bytes.
    let len = (payload.len() + LEN_OVERHEAD) as u8;
    let mut out = Vec::with_capacity(payload.len() + MIN_FRAME_LEN);
    out.extend_from_slice(&SYNC);
    out.push(id);
    out.push(len);
    out.push(opcode);
    out.extend_from_slice(payload);
    out.push(checksum(id, len, opcode, payload));
    out
}

fn encode_fields(command: Command, fields: &[FieldSpec], params: &[i32]) -> Result<Vec<u8>, BusError> {
    if params.len() != value_count(fields) {
        return Err(BusError::InvalidArgument(format!(
            "{command:?} takes {} parameters, got {}",
            value_count(fields),
            params.len()
        )));
    }

    let mut out = Vec::with_capacity(layout_width(fields));
    let mut values = params.iter();
    for field in fields {
        if field.kind == FieldKind::Pad {
            out.push(0);
            continue;
        }
        // Counts were checked above.
        let Some(&value) = values.next() else { break };
        if value < field.min || value > field.max {
            return Err(BusError::ParameterOutOfRange {
                field: field.name,
                value: value.into(),
                min: field.min.into(),
                max: field.max.into(),
            });
        }
        match field.kind {
            FieldKind::U8 | FieldKind::I8 => out.push(value as u8),
            FieldKind::U16 | FieldKind::I16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            FieldKind::Pad => {}
        }
    }
    Ok(out)
}

fn decode_fields(fields: &[FieldSpec], payload: &[u8]) -> Vec<i32> {
    let mut params = Vec::with_capacity(fields.len());
    let mut at = 0;
    for field in fields {
        let bytes = &payload[at..at + field.kind.width()];
        at += field.kind.width();
        match field.kind {
            FieldKind::U8 => params.push(i32::from(bytes[0])),
            FieldKind::I8 => params.push(i32::from(bytes[0] as i8)),
            FieldKind::U16 => params.push(i32::from(u16::from_le_bytes([bytes[0], bytes[1]]))),
            FieldKind::I16 => params.push(i32::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
            FieldKind::Pad => {}
        }
    }
    params
}

fn framing(reason: &str, raw: &[u8]) -> BusError {
    BusError::FramingError { reason: reason.to_string(), raw: raw.to_vec() }
}
