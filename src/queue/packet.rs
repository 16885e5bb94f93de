//! Gearman binary packet codec (worker subset)
//!
//! Layout: `magic(4) | type(u32 BE) | size(u32 BE) | data(size)`, with
//! arguments inside `data` separated by NUL bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{QueueError, Result};

pub const REQUEST_MAGIC: [u8; 4] = *b"\0REQ";
pub const RESPONSE_MAGIC: [u8; 4] = *b"\0RES";

const HEADER_LEN: usize = 12;
const MAX_DATA_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Request,
    Response,
}

impl Magic {
    fn bytes(self) -> [u8; 4] {
        match self {
            Magic::Request => REQUEST_MAGIC,
            Magic::Response => RESPONSE_MAGIC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    CanDo,
    PreSleep,
    Noop,
    GrabJob,
    NoJob,
    JobAssign,
    WorkComplete,
    Error,
    SetClientId,
    WorkException,
}

impl PacketType {
    pub fn code(self) -> u32 {
        match self {
            PacketType::CanDo => 1,
            PacketType::PreSleep => 4,
            PacketType::Noop => 6,
            PacketType::GrabJob => 9,
            PacketType::NoJob => 10,
            PacketType::JobAssign => 11,
            PacketType::WorkComplete => 13,
            PacketType::Error => 19,
            PacketType::SetClientId => 22,
            PacketType::WorkException => 25,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => PacketType::CanDo,
            4 => PacketType::PreSleep,
            6 => PacketType::Noop,
            9 => PacketType::GrabJob,
            10 => PacketType::NoJob,
            11 => PacketType::JobAssign,
            13 => PacketType::WorkComplete,
            19 => PacketType::Error,
            22 => PacketType::SetClientId,
            25 => PacketType::WorkException,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub magic: Magic,
    pub kind: PacketType,
    pub data: Bytes,
}

impl Packet {
    pub fn request(kind: PacketType, data: impl Into<Bytes>) -> Self {
        Self {
            magic: Magic::Request,
            kind,
            data: data.into(),
        }
    }

    pub fn response(kind: PacketType, data: impl Into<Bytes>) -> Self {
        Self {
            magic: Magic::Response,
            kind,
            data: data.into(),
        }
    }

    /// Build a packet whose data is `args` joined by NUL
    pub fn with_args(magic: Magic, kind: PacketType, args: &[&[u8]]) -> Self {
        let mut data = BytesMut::new();
        for (idx, arg) in args.iter().enumerate() {
            if idx > 0 {
                data.put_u8(0);
            }
            data.put_slice(arg);
        }
        Self {
            magic,
            kind,
            data: data.freeze(),
        }
    }

    /// Split data into at most `n` NUL-separated arguments; the last keeps any NULs
    pub fn args(&self, n: usize) -> Vec<Bytes> {
        let mut args = Vec::with_capacity(n);
        let mut rest = self.data.clone();

        while args.len() + 1 < n {
            match rest.iter().position(|&b| b == 0) {
                Some(pos) => {
                    args.push(rest.slice(..pos));
                    rest = rest.slice(pos + 1..);
                }
                None => break,
            }
        }
        args.push(rest);
        args
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.put_slice(&self.magic.bytes());
        buf.put_u32(self.kind.code());
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let magic = match [header[0], header[1], header[2], header[3]] {
        REQUEST_MAGIC => Magic::Request,
        RESPONSE_MAGIC => Magic::Response,
        other => {
            return Err(QueueError::Protocol(format!("bad packet magic {:?}", other)));
        }
    };

    let code = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let kind = PacketType::from_code(code)
        .ok_or_else(|| QueueError::Protocol(format!("unsupported packet type {}", code)))?;

    let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    if len > MAX_DATA_LEN {
        return Err(QueueError::Protocol(format!(
            "packet of {} bytes exceeds limit of {}",
            len, MAX_DATA_LEN
        )));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;

    Ok(Packet {
        magic,
        kind,
        data: Bytes::from(data),
    })
}

pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> Result<()> {
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}
