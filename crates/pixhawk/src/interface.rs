use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use bytes::{Buf, BytesMut};
use crc_any::CRCu16;
use tracing::*;

use mavlink::{common, MavHeader, MavlinkVersion};

use crate::{TaskStatusError, TaskStatusRecord};

const MAGIC_V1: u8 = 0xFE;
const MAGIC_V2: u8 = 0xFD;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Something received from the flight controller.
#[derive(Debug)]
pub enum Frame {
    Mavlink {
        header: MavHeader,
        message: common::MavMessage,
    },
    TaskStatus(TaskStatusRecord),
}

/// One complete frame in the receive buffer, magic byte included.
struct RawFrame<'a> {
    version: MavlinkVersion,
    bytes: &'a [u8],
}

impl<'a> RawFrame<'a> {
    fn header_len(version: MavlinkVersion) -> usize {
        match version {
            // magic, len, seq, sysid, compid, msgid
            MavlinkVersion::V1 => 6,
            // magic, len, incompat, compat, seq, sysid, compid, msgid (3 bytes)
            MavlinkVersion::V2 => 10,
        }
    }

    /// Total frame length given the header at the start of `buf`.
    fn frame_len(version: MavlinkVersion, buf: &[u8]) -> usize {
        let payload_len = buf[1] as usize;
        let signature = match version {
            MavlinkVersion::V2 if buf[2] & INCOMPAT_FLAG_SIGNED != 0 => SIGNATURE_LEN,
            _ => 0,
        };

        Self::header_len(version) + payload_len + CHECKSUM_LEN + signature
    }

    fn sequence(&self) -> u8 {
        match self.version {
            MavlinkVersion::V1 => self.bytes[2],
            MavlinkVersion::V2 => self.bytes[4],
        }
    }

    fn message_id(&self) -> u32 {
        match self.version {
            MavlinkVersion::V1 => self.bytes[5] as u32,
            MavlinkVersion::V2 => {
                self.bytes[7] as u32 | (self.bytes[8] as u32) << 8 | (self.bytes[9] as u32) << 16
            }
        }
    }

    fn payload_end(&self) -> usize {
        Self::header_len(self.version) + self.bytes[1] as usize
    }

    fn payload(&self) -> &'a [u8] {
        &self.bytes[Self::header_len(self.version)..self.payload_end()]
    }

    fn checksum(&self) -> u16 {
        let end = self.payload_end();
        u16::from_le_bytes([self.bytes[end], self.bytes[end + 1]])
    }

    /// Verifies the X.25 checksum, which covers everything after the magic
    /// byte up to the end of the payload, seeded with the message's CRC_EXTRA.
    fn verify_checksum(&self, crc_extra: u8) -> Result<(), TaskStatusError> {
        let expected = frame_checksum(&self.bytes[1..self.payload_end()], crc_extra);
        let actual = self.checksum();

        if expected == actual {
            Ok(())
        } else {
            Err(TaskStatusError::Checksum { expected, actual })
        }
    }
}

fn frame_checksum(covered: &[u8], crc_extra: u8) -> u16 {
    let mut crc_calc = CRCu16::crc16mcrf4cc();
    crc_calc.digest(covered);
    crc_calc.digest(&[crc_extra]);
    crc_calc.get_crc()
}

pub struct PixhawkInterface {
    sock: tokio::net::UdpSocket,
    buf: BytesMut,
    seq_num: Option<u8>,
    sequence: u8,
    version: MavlinkVersion,
    system_id: u8,
    component_id: u8,
    /// (message id, CRC_EXTRA) of the task status record, if bridged.
    task_status: Option<(u32, u8)>,
}

impl PixhawkInterface {
    /// Binds `addr` and waits, without a deadline, for the first packet. The
    /// sender of that packet becomes the only peer we talk to.
    pub async fn connect(
        addr: SocketAddr,
        version: MavlinkVersion,
        system_id: u8,
        component_id: u8,
        task_status: Option<(u32, u8)>,
    ) -> anyhow::Result<Self> {
        let sock = tokio::net::UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!("waiting for packet from flight controller on {}", addr);

        let remote_addr = loop {
            // peek so the first datagram is still parsed afterwards
            let mut probe = [0u8; 1];
            match tokio::time::timeout(Duration::from_secs(10), sock.peek_from(&mut probe)).await {
                Ok(Ok((_, remote_addr))) => break remote_addr,
                // truncated datagrams are reported as errors on some platforms
                Ok(Err(err)) => {
                    debug!("error peeking first packet: {:?}", err);
                    let (_, remote_addr) = sock
                        .recv_from(&mut [0u8; 2048])
                        .await
                        .context("error retrieving packet from flight controller")?;
                    break remote_addr;
                }
                Err(_) => info!("still waiting for flight controller"),
            }
        };

        info!(
            "received packet from {:?}, locking to this address",
            remote_addr
        );

        sock.connect(remote_addr)
            .await
            .context("failed to lock to address")?;

        match version {
            MavlinkVersion::V1 => debug!("using mavlink v1"),
            MavlinkVersion::V2 => debug!("using mavlink v2"),
        };

        Ok(PixhawkInterface {
            sock,
            buf: BytesMut::with_capacity(4096),
            seq_num: None,
            sequence: 0,
            version,
            system_id,
            component_id,
            task_status,
        })
    }

    /// Sends a message to the flight controller.
    pub async fn send(&mut self, message: &common::MavMessage) -> anyhow::Result<()> {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        trace!("sending message: {:?}", message);

        let header = MavHeader {
            sequence,
            system_id: self.system_id,
            component_id: self.component_id,
        };

        let mut buf = Vec::with_capacity(280);

        mavlink::write_versioned_msg(&mut buf, self.version, header, message)
            .context("failed to serialize message")?;
        self.sock.send(buf.as_ref()).await?;

        Ok(())
    }

    async fn fill(&mut self) -> anyhow::Result<()> {
        let mut chunk = [0u8; 2048];
        let n = self
            .sock
            .recv(&mut chunk[..])
            .await
            .context("error receiving from flight controller")?;
        self.buf.extend_from_slice(&chunk[..n]);
        trace!("read {:?} bytes, buf is {:?} bytes long", n, self.buf.len());
        Ok(())
    }

    /// Waits for the next complete frame from the flight controller.
    ///
    /// The only await point is the socket read and the buffer is only touched
    /// after it completes, so dropping this future loses no data.
    pub async fn recv(&mut self) -> anyhow::Result<Frame> {
        let magic = match self.version {
            MavlinkVersion::V1 => MAGIC_V1,
            MavlinkVersion::V2 => MAGIC_V2,
        };
        let header_len = RawFrame::header_len(self.version);

        loop {
            match self.buf.iter().position(|&b| b == magic) {
                Some(0) => {}
                Some(magic_position) => {
                    trace!("skipping {} bytes before magic", magic_position);
                    self.buf.advance(magic_position);
                }
                None => {
                    self.buf.clear();
                    self.fill().await?;
                    continue;
                }
            }

            if self.buf.len() < header_len {
                self.fill().await?;
                continue;
            }

            let frame_len = RawFrame::frame_len(self.version, &self.buf);

            if self.buf.len() < frame_len {
                trace!("need {:?} bytes, have {:?}", frame_len, self.buf.len());
                self.fill().await?;
                continue;
            }

            let raw = RawFrame {
                version: self.version,
                bytes: &self.buf[..frame_len],
            };

            let parsed = match self.task_status {
                Some((message_id, crc_extra)) if raw.message_id() == message_id => raw
                    .verify_checksum(crc_extra)
                    .and_then(|_| TaskStatusRecord::decode(raw.payload()))
                    .map(Frame::TaskStatus)
                    .map_err(anyhow::Error::from),
                _ => mavlink::read_versioned_msg::<common::MavMessage, _>(
                    &mut &raw.bytes[..],
                    self.version,
                )
                .map(|(header, message)| Frame::Mavlink { header, message })
                .map_err(|err| anyhow::anyhow!("{:?}", err)),
            };

            match parsed {
                Ok(frame) => {
                    let seq_num = raw.sequence();
                    self.track_sequence(seq_num);
                    self.buf.advance(frame_len);
                    return Ok(frame);
                }
                // either a corrupt frame or a magic byte inside some other
                // frame's payload: resync from the next byte
                Err(err) => {
                    warn!(
                        "message parsing failure ({:?}); frame contents: {:02x?}",
                        err, raw.bytes
                    );
                    self.buf.advance(1);
                }
            }
        }
    }

    fn track_sequence(&mut self, seq_num: u8) {
        if let Some(prev_seq_num) = self.seq_num {
            let expected_seq_num = prev_seq_num.wrapping_add(1);
            if expected_seq_num != seq_num {
                debug!(
                    "unexpected sequence number {seq_num} (wanted {expected_seq_num}), lost {} packets",
                    seq_num.wrapping_sub(expected_seq_num)
                );
            }
        }

        self.seq_num = Some(seq_num);
    }
}
