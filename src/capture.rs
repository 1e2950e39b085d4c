//! Packet sources.
//!
//! Two sources feed the flow table: a legacy pcap capture file (always
//! available, pure Rust) and live capture from a network interface (behind
//! the `live` cargo feature, links against libpcap). Either way, packets
//! are dissected down to the TCP layer with `etherparse` and anything that
//! is not TCP over IPv4/IPv6 is ignored.

use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::data::{PacketData, get_packetdata};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::flow::FlowIdentity;
use crate::reassembly::{FlowTable, Segment};

/// Options for the live capture source. Parsed from the CLI; unused by the
/// file source.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub device: String,
    pub bpf: String,
    pub promiscuous: bool,
    pub snap_len: i32,
}

/// Replays a legacy pcap file into the flow table. Returns the number of
/// packets read.
pub fn run_file_capture(path: &Path, table: &mut FlowTable) -> Result<u64, CaptureError> {
    let file = File::open(path)?;
    let mut reader =
        LegacyPcapReader::new(65536, file).map_err(|e| CaptureError::malformed(format!("{e:?}")))?;

    let mut linktype = Linktype::ETHERNET;
    let mut packets = 0u64;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        debug!(linktype = ?header.network, "capture file header");
                        linktype = header.network;
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        packets += 1;
                        let data = get_packetdata(packet.data, linktype, packet.caplen as usize);
                        if let Some(segment) = data.and_then(dissect) {
                            table.accept(segment);
                        }
                    }
                    PcapBlockOwned::NG(_) => {
                        warn!("pcapng block skipped; convert the file to legacy pcap");
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| CaptureError::malformed(format!("{e:?}")))?;
            }
            Err(e) => return Err(CaptureError::malformed(format!("{e:?}"))),
        }
    }

    info!(packets, "capture file replayed");
    Ok(packets)
}

fn dissect(data: PacketData<'_>) -> Option<Segment> {
    match data {
        PacketData::L2(bytes) => dissect_ethernet(bytes),
        PacketData::L3(_, bytes) => dissect_ip(bytes),
        _ => None,
    }
}

/// Dissects an ethernet frame down to a TCP segment, if it is one.
pub fn dissect_ethernet(frame: &[u8]) -> Option<Segment> {
    segment_of(SlicedPacket::from_ethernet(frame).ok()?)
}

/// Dissects a raw IP packet down to a TCP segment, if it is one.
pub fn dissect_ip(packet: &[u8]) -> Option<Segment> {
    segment_of(SlicedPacket::from_ip(packet).ok()?)
}

fn segment_of(sliced: SlicedPacket<'_>) -> Option<Segment> {
    let (src_ip, dst_ip) = match sliced.net? {
        NetSlice::Ipv4(ip) => (ip.header().source_addr().into(), ip.header().destination_addr().into()),
        NetSlice::Ipv6(ip) => (ip.header().source_addr().into(), ip.header().destination_addr().into()),
    };

    let TransportSlice::Tcp(tcp) = sliced.transport? else {
        return None;
    };

    Some(Segment {
        flow: FlowIdentity {
            src_ip,
            src_port: tcp.source_port(),
            dst_ip,
            dst_port: tcp.destination_port(),
        },
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: Bytes::copy_from_slice(tcp.payload()),
    })
}

#[cfg(feature = "live")]
mod live {
    use std::time::Instant;

    use pcap::{Capture, Device};
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    use super::{CaptureOptions, dissect_ethernet, dissect_ip};
    use crate::error::CaptureError;
    use crate::reassembly::{FLUSH_INTERVAL, FlowTable, IDLE_AGE};

    /// How long one blocking read may sit before the loop gets a chance to
    /// check for shutdown and idle flushing.
    const POLL_TIMEOUT_MS: i32 = 250;

    /// Captures live from an interface until cancelled.
    pub fn run_live_capture(
        options: &CaptureOptions,
        table: &mut FlowTable,
        shutdown: &CancellationToken,
    ) -> Result<(), CaptureError> {
        let mut capture = Capture::from_device(options.device.as_str())?
            .promisc(options.promiscuous)
            .snaplen(options.snap_len)
            .timeout(POLL_TIMEOUT_MS)
            .open()?;
        capture.filter(&options.bpf, true)?;
        let ethernet = capture.get_datalink() == pcap::Linktype::ETHERNET;
        info!(device = %options.device, bpf = %options.bpf, "live capture started");

        let mut last_flush = Instant::now();
        loop {
            if shutdown.is_cancelled() {
                info!("live capture stopped");
                return Ok(());
            }
            if last_flush.elapsed() >= FLUSH_INTERVAL {
                table.flush_older_than(IDLE_AGE);
                last_flush = Instant::now();
            }

            match capture.next_packet() {
                Ok(packet) => {
                    let segment = if ethernet {
                        dissect_ethernet(packet.data)
                    } else {
                        dissect_ip(packet.data)
                    };
                    if let Some(segment) = segment {
                        table.accept(segment);
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Prints every capture-capable device, one per line, or with flags,
    /// addresses and description when `full` is set.
    pub fn list_devices(full: bool) -> Result<(), CaptureError> {
        for device in Device::list()? {
            if full {
                println!("Name: {}", device.name);
                println!("Flags: {:?}", device.flags);
                println!("Addr: {:?}", device.addresses);
                println!("Desc: {}", device.desc.unwrap_or_default());
                println!();
            } else {
                println!("{}", device.name);
            }
        }
        Ok(())
    }
}

#[cfg(feature = "live")]
pub use live::{list_devices, run_live_capture};

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn tcp_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(43210, 80, 1000, 1024);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    #[test]
    fn dissects_tcp_over_ethernet() {
        let frame = tcp_frame(b"GET / HTTP/1.1\r\n");
        let segment = dissect_ethernet(&frame).unwrap();
        assert_eq!(segment.flow.src_ip, "10.0.0.1".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(segment.flow.src_port, 43210);
        assert_eq!(segment.flow.dst_port, 80);
        assert_eq!(segment.seq, 1000);
        assert_eq!(&segment.payload[..], b"GET / HTTP/1.1\r\n");
        assert!(!segment.syn && !segment.fin && !segment.rst);
    }

    #[test]
    fn syn_flag_is_carried() {
        let builder = PacketBuilder::ethernet2([0; 6], [0; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(1, 2, 7, 1024)
            .syn();
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();
        let segment = dissect_ethernet(&frame).unwrap();
        assert!(segment.syn);
        assert_eq!(segment.seq, 7);
    }

    #[test]
    fn non_tcp_traffic_is_ignored() {
        let builder = PacketBuilder::ethernet2([0; 6], [0; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(5353, 5353);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"not tcp").unwrap();
        assert!(dissect_ethernet(&frame).is_none());
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(dissect_ethernet(&[0u8; 10]).is_none());
        assert!(dissect_ip(b"junk").is_none());
    }
}
