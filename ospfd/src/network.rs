//
// Copyright (c) The ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, Bytes};
use serde::Serialize;
use tokio::sync::Notify;

use crate::packet::error::{DecodeError, DecodeResult};
use crate::tasks::messages::output::NetTxPacketMsg;

// OSPF IP protocol number.
pub const OSPF_IP_PROTO: i32 = 89;

// Set of destination addresses of an outgoing packet.
pub type SendDestination = smallvec::SmallVec<[Ipv4Addr; 4]>;

// Maximum depth of an interface's pending-send queue.
const TX_QUEUE_DEPTH: usize = 64;

// OSPFv2 multicast addresses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Bounded per-interface transmission queue.
//
// When the queue overflows, the oldest unsent packet is dropped to make room
// for the new one. Closing the queue lets the write loop drain the pending
// packets and exit.
#[derive(Debug, Default)]
pub struct TxQueue {
    ifname: String,
    queue: Mutex<VecDeque<NetTxPacketMsg>>,
    notify: Notify,
    closed: AtomicBool,
}

// ===== impl MulticastAddr =====

impl MulticastAddr {
    pub(crate) const fn addr(&self) -> Ipv4Addr {
        match self {
            MulticastAddr::AllSpfRtrs => Ipv4Addr::new(224, 0, 0, 5),
            MulticastAddr::AllDrRtrs => Ipv4Addr::new(224, 0, 0, 6),
        }
    }
}

// ===== impl TxQueue =====

impl TxQueue {
    pub(crate) fn new(ifname: String) -> TxQueue {
        TxQueue {
            ifname,
            queue: Default::default(),
            notify: Default::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, msg: NetTxPacketMsg) {
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() >= TX_QUEUE_DEPTH
                && let Some(old) = queue.pop_front()
            {
                tracing::warn!(
                    interface = %self.ifname,
                    packet_type = ?old.packet.hdr().pkt_type,
                    "send queue full, dropping oldest unsent packet"
                );
            }
            queue.push_back(msg);
        }
        self.notify.notify_one();
    }

    // Returns the next packet to transmit, or `None` once the queue was
    // closed and fully drained.
    pub(crate) async fn pop(&self) -> Option<NetTxPacketMsg> {
        loop {
            if let Some(msg) = self.queue.lock().unwrap().pop_front() {
                return Some(msg);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

// ===== global functions =====

// Creates a raw IPv4 socket bound to OSPF's protocol number.
#[cfg(not(feature = "testing"))]
pub(crate) fn socket(
    ifname: &str,
) -> Result<socket2::Socket, std::io::Error> {
    use nix::sys::socket::sockopt::Ipv4PacketInfo;
    use socket2::{Domain, Protocol, Socket, Type};

    let socket =
        Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(OSPF_IP_PROTO)))?;

    socket.set_nonblocking(true)?;
    socket.bind_device(Some(ifname.as_bytes()))?;
    socket.set_multicast_loop_v4(false)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_tos_v4(libc::IPTOS_PREC_INTERNETCONTROL as u32)?;
    nix::sys::socket::setsockopt(&socket, Ipv4PacketInfo, &true)
        .map_err(std::io::Error::from)?;

    Ok(socket)
}

// Joins the specified OSPF multicast group.
#[cfg(not(feature = "testing"))]
pub(crate) fn join_multicast(
    socket: &socket2::Socket,
    addr: MulticastAddr,
    ifindex: u32,
) -> Result<(), std::io::Error> {
    socket.join_multicast_v4_n(
        &addr.addr(),
        &socket2::InterfaceIndexOrAddress::Index(ifindex),
    )
}

// Leaves the specified OSPF multicast group.
#[cfg(not(feature = "testing"))]
pub(crate) fn leave_multicast(
    socket: &socket2::Socket,
    addr: MulticastAddr,
    ifindex: u32,
) -> Result<(), std::io::Error> {
    socket.leave_multicast_v4_n(
        &addr.addr(),
        &socket2::InterfaceIndexOrAddress::Index(ifindex),
    )
}

// Validates and strips the IPv4 header of a received packet.
pub(crate) fn validate_ip_hdr(buf: &mut Bytes) -> DecodeResult<()> {
    let buf_len = buf.len() as u16;

    // Parse IHL (header length).
    let hdr_len = buf.get_u8() & 0x0F;

    // Ignore TOS.
    let _ = buf.get_u8();

    // Parse and validate the IP header total length.
    let total_len = buf.get_u16();
    if buf_len != total_len {
        return Err(DecodeError::InvalidIpHdrLength(total_len));
    }

    // Move past the IP header.
    buf.advance(((hdr_len << 2) - 4) as usize);

    Ok(())
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn send_packet(
    socket: &tokio::io::unix::AsyncFd<socket2::Socket>,
    ifname: &str,
    ifindex: u32,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    packet: &crate::packet::Packet,
) -> Result<usize, crate::error::IoError> {
    use std::io::IoSlice;
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{self, SockaddrIn};

    use crate::debug::Debug;
    use crate::error::IoError;

    // Log packet being sent.
    Debug::PacketTx(ifname, &dst, packet).log();

    // Encode packet.
    let buf = packet.encode();

    // Send packet.
    let iov = [IoSlice::new(&buf)];
    let sockaddr: SockaddrIn = std::net::SocketAddrV4::new(dst, 0).into();
    let pktinfo = libc::in_pktinfo {
        ipi_ifindex: ifindex as i32,
        ipi_spec_dst: libc::in_addr { s_addr: 0 },
        ipi_addr: libc::in_addr { s_addr: src.into() },
    };
    let cmsg = [socket::ControlMessage::Ipv4PacketInfo(&pktinfo)];
    socket
        .async_io(tokio::io::Interest::WRITABLE, |socket| {
            socket::sendmsg(
                socket.as_raw_fd(),
                &iov,
                &cmsg,
                socket::MsgFlags::empty(),
                Some(&sockaddr),
            )
            .map_err(|errno| errno.into())
        })
        .await
        .map_err(IoError::SendError)
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn write_loop(
    socket: std::sync::Arc<tokio::io::unix::AsyncFd<socket2::Socket>>,
    ifname: String,
    ifindex: u32,
    src: Ipv4Addr,
    tx_queue: std::sync::Arc<TxQueue>,
) {
    while let Some(NetTxPacketMsg { packet, dst }) = tx_queue.pop().await {
        // Send packet to all requested destinations.
        for dst in dst {
            if let Err(error) =
                send_packet(&socket, &ifname, ifindex, src, dst, &packet).await
            {
                error.log();
            }
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn read_loop(
    socket: std::sync::Arc<tokio::io::unix::AsyncFd<socket2::Socket>>,
    area_id: crate::collections::AreaId,
    iface_id: crate::collections::InterfaceId,
    net_packet_rxp: tokio::sync::mpsc::Sender<
        crate::tasks::messages::input::NetRxPacketMsg,
    >,
) -> Result<
    (),
    tokio::sync::mpsc::error::SendError<
        crate::tasks::messages::input::NetRxPacketMsg,
    >,
> {
    use std::io::IoSliceMut;
    use std::ops::Deref;
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{self, SockaddrIn};

    use crate::error::IoError;
    use crate::packet::Packet;
    use crate::tasks::messages::input::NetRxPacketMsg;

    let mut buf = [0; 16384];
    let mut iov = [IoSliceMut::new(&mut buf)];
    let mut cmsgspace = nix::cmsg_space!(libc::in_pktinfo);

    loop {
        // Receive data packet.
        match socket
            .async_io(tokio::io::Interest::READABLE, |socket| {
                match socket::recvmsg::<SockaddrIn>(
                    socket.as_raw_fd(),
                    &mut iov,
                    Some(&mut cmsgspace),
                    socket::MsgFlags::empty(),
                ) {
                    Ok(msg) => {
                        // Retrieve source and destination addresses.
                        let src = msg
                            .address
                            .as_ref()
                            .map(|addr| Ipv4Addr::from(addr.ip()));
                        let dst = msg.cmsgs().unwrap().find_map(|cmsg| {
                            if let socket::ControlMessageOwned::Ipv4PacketInfo(
                                pktinfo,
                            ) = cmsg
                            {
                                Some(Ipv4Addr::from(
                                    pktinfo.ipi_spec_dst.s_addr.to_be(),
                                ))
                            } else {
                                None
                            }
                        });
                        Ok((src, dst, msg.bytes))
                    }
                    Err(errno) => Err(errno.into()),
                }
            })
            .await
        {
            Ok((src, dst, bytes)) => {
                let src = match src {
                    Some(addr) => addr,
                    None => {
                        IoError::RecvMissingSourceAddr.log();
                        return Ok(());
                    }
                };
                let dst = match dst {
                    Some(addr) => addr,
                    None => {
                        IoError::RecvMissingAncillaryData.log();
                        return Ok(());
                    }
                };

                // Decode packet.
                let mut buf = Bytes::copy_from_slice(&iov[0].deref()[0..bytes]);
                let packet = validate_ip_hdr(&mut buf)
                    .and_then(|_| Packet::decode(&mut buf));
                let msg = NetRxPacketMsg {
                    area_key: area_id.into(),
                    iface_key: iface_id.into(),
                    src,
                    dst,
                    packet,
                };
                net_packet_rxp.send(msg).await?;
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {
                // Retry if the syscall was interrupted (EINTR).
                continue;
            }
            Err(error) => {
                IoError::RecvError(error).log();
            }
        }
    }
}
