// Tones
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! A tone generator that plays notes on a SuperCollider server.
//!
//! [`ScToneGenerator`] creates one synth node per playable. The node is created straight away
//! with its `amp` control at zero and every later change is sent as an OSC bundle timestamped
//! with the time it should take effect, so the server plays the note exactly on time as long as
//! the bundles arrive early. Times on the scheduler's clock are turned into wall clock time by
//! adding them to an epoch.
//!
//! The synth definition is expected to have `freq`, `amp`, `pan` and `lag` controls, where `lag`
//! is how long the synth takes to slide to a new `amp`.
//!
//! Packets are written to a [`Transport`]: a [`UdpTransport`] talks to a real server and a
//! [`MemoryTransport`] keeps them for inspection.
//!
//! # Examples
//!
//! ```
//! use tones::{
//!     osc::{MemoryTransport, ScToneGenerator},
//!     scheduler::{PlayableParams, ToneGenerator},
//! };
//! use std::time::SystemTime;
//!
//! let transport = MemoryTransport::new();
//! let mut generator = ScToneGenerator::new(transport.clone(), SystemTime::now());
//! generator.create_playable(PlayableParams {
//!     frequency: 440.0,
//!     start: 0.0,
//!     end: 1.0,
//!     vel: 1.0,
//!     pan: 0.0,
//! })?;
//!
//! let packets = transport.packets()?;
//! assert_eq!(1, packets.len());
//! # tones::osc::Result::Ok(())
//! ```

use crate::{
    envelope::{ControlParameter, Envelope, HorizontalTransform},
    scheduler::{Playable, PlayableParams, ToneGenerator},
};
use rosc::{
    decoder::decode, encoder::encode, OscBundle, OscError, OscMessage, OscPacket, OscTime, OscType,
};
use std::{
    cell::RefCell,
    fmt, io,
    net::{ToSocketAddrs, UdpSocket},
    rc::Rc,
    time::{Duration, SystemTime},
};
use thiserror::Error;

/// A specialized [`Result`] type for OSC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by the OSC tone generator and its transports.
#[derive(Debug, Error)]
pub enum Error {
    #[error("binding to UDP socket")]
    UdpBind(#[source] io::Error),
    #[error("connecting UDP socket to server")]
    UdpConnect(#[source] io::Error),
    #[error("sending packet to server")]
    Send(#[source] io::Error),
    #[error("encoding OSC packet: {0:?}")]
    OscEncode(OscError),
    #[error("decoding OSC packet: {0:?}")]
    OscDecode(OscError),
}

/// Somewhere to write encoded OSC packets.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Sends packets to a server over UDP.
#[derive(Debug)]
pub struct UdpTransport(UdpSocket);

impl UdpTransport {
    /// Connects to an externally running server using the given UDP address.
    ///
    /// # Errors
    ///
    /// Returns an error if a UDP socket cannot be created or if the UDP socket cannot connect to
    /// the `server_address`.
    pub fn connect<A: ToSocketAddrs>(server_address: A) -> Result<UdpTransport> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::UdpBind)?;
        socket
            .connect(server_address)
            .map_err(Error::UdpConnect)?;
        Ok(UdpTransport(socket))
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.send(bytes).map(|_| ())
    }
}

/// Keeps every packet in memory.
///
/// Clones share the same packets.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport(Rc<RefCell<Vec<Vec<u8>>>>);

impl MemoryTransport {
    pub fn new() -> MemoryTransport {
        MemoryTransport::default()
    }

    /// Decodes the packets sent so far.
    pub fn packets(&self) -> Result<Vec<OscPacket>> {
        self.0
            .borrow()
            .iter()
            .map(|bytes| decode(bytes).map_err(Error::OscDecode))
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.borrow_mut().push(bytes.to_vec());
        Ok(())
    }
}

struct Connection<T> {
    transport: RefCell<T>,
    epoch: SystemTime,
}

impl<T: Transport> Connection<T> {
    fn send(&self, packet: &OscPacket) -> Result<()> {
        log::trace!("send: {:?}", packet);
        let bytes = encode(packet).map_err(Error::OscEncode)?;
        self.transport
            .borrow_mut()
            .send(&bytes)
            .map_err(Error::Send)
    }

    fn send_at(&self, time: f64, messages: Vec<OscMessage>) -> Result<()> {
        let bundle = OscBundle {
            timetag: osc_time(self.wall_time(time)),
            content: messages.into_iter().map(OscPacket::Message).collect(),
        };
        self.send(&OscPacket::Bundle(bundle))
    }

    fn wall_time(&self, time: f64) -> SystemTime {
        if time >= 0.0 {
            self.epoch + Duration::from_secs_f64(time)
        } else {
            self.epoch - Duration::from_secs_f64(-time)
        }
    }
}

/// Plays notes as SuperCollider synth nodes.
///
/// _See [the module level documentation](self) for more._
pub struct ScToneGenerator<T> {
    connection: Rc<Connection<T>>,
    synth_name: String,
    target: i32,
    next_node_id: i32,
}

impl<T> fmt::Debug for ScToneGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScToneGenerator")
            .field("epoch", &self.connection.epoch)
            .field("synth_name", &self.synth_name)
            .field("target", &self.target)
            .field("next_node_id", &self.next_node_id)
            .finish()
    }
}

impl<T: Transport> ScToneGenerator<T> {
    /// Creates a generator that plays the `tone` synth definition at the head of group `1`.
    ///
    /// Time zero on the scheduler's clock is played at `epoch`.
    pub fn new(transport: T, epoch: SystemTime) -> ScToneGenerator<T> {
        ScToneGenerator {
            connection: Rc::new(Connection {
                transport: RefCell::new(transport),
                epoch,
            }),
            synth_name: "tone".to_owned(),
            target: 1,
            next_node_id: 1000,
        }
    }

    /// Sets the name of the synth definition used for every note.
    pub fn synth_name(mut self, synth_name: impl Into<String>) -> Self {
        self.synth_name = synth_name.into();
        self
    }

    /// Sets the group that new nodes are added to.
    pub fn target(mut self, target: i32) -> Self {
        self.target = target;
        self
    }

    /// Sets the first node ID handed out. Defaults to 1000.
    pub fn first_node_id(mut self, node_id: i32) -> Self {
        self.next_node_id = node_id;
        self
    }

    pub fn epoch(&self) -> SystemTime {
        self.connection.epoch
    }
}

impl<T: Transport> ToneGenerator for ScToneGenerator<T> {
    type Playable = SynthNode<T>;
    type Error = Error;

    fn create_playable(&mut self, params: PlayableParams) -> Result<SynthNode<T>> {
        let node_id = self.next_node_id;
        let message = OscMessage {
            addr: "/s_new".to_owned(),
            args: vec![
                OscType::String(self.synth_name.clone()),
                OscType::Int(node_id),
                OscType::Int(0),
                OscType::Int(self.target),
                OscType::String("freq".to_owned()),
                OscType::Float(params.frequency as f32),
                OscType::String("amp".to_owned()),
                OscType::Float(0.0),
                OscType::String("pan".to_owned()),
                OscType::Float(params.pan as f32),
            ],
        };
        self.connection.send(&OscPacket::Message(message))?;
        self.next_node_id += 1;
        log::debug!("created node {} at {:.1} Hz", node_id, params.frequency);

        Ok(SynthNode {
            connection: Rc::clone(&self.connection),
            node_id,
            last_time: params.start,
            freed: false,
        })
    }
}

/// A synth node created by [`ScToneGenerator`].
pub struct SynthNode<T> {
    connection: Rc<Connection<T>>,
    node_id: i32,
    last_time: f64,
    freed: bool,
}

impl<T> fmt::Debug for SynthNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthNode")
            .field("node_id", &self.node_id)
            .field("last_time", &self.last_time)
            .field("freed", &self.freed)
            .finish()
    }
}

impl<T: Transport> SynthNode<T> {
    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    fn set_amp(&mut self, value: f64, time: f64, lag: f64) {
        if self.freed {
            return;
        }
        let message = OscMessage {
            addr: "/n_set".to_owned(),
            args: vec![
                OscType::Int(self.node_id),
                OscType::String("amp".to_owned()),
                OscType::Float(value as f32),
                OscType::String("lag".to_owned()),
                OscType::Float(lag as f32),
            ],
        };
        if let Err(err) = self.connection.send_at(time, vec![message]) {
            log::error!("setting amp of node {}: {}", self.node_id, err);
        }
        self.last_time = time;
    }

    fn free_at(&mut self, time: Option<f64>) {
        let message = OscMessage {
            addr: "/n_free".to_owned(),
            args: vec![OscType::Int(self.node_id)],
        };
        let result = match time {
            Some(time) => self.connection.send_at(time, vec![message]),
            None => self.connection.send(&OscPacket::Message(message)),
        };
        if let Err(err) = result {
            log::error!("freeing node {}: {}", self.node_id, err);
        }
    }
}

impl<T: Transport> ControlParameter for SynthNode<T> {
    fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.set_amp(value, time, 0.0);
    }

    /// Starts sliding at the time of the previous change, reaching `value` at `time`.
    fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        let from = self.last_time.min(time);
        self.set_amp(value, from, time - from);
        self.last_time = time;
    }
}

impl<T: Transport> Playable for SynthNode<T> {
    fn gain(&mut self) -> &mut dyn ControlParameter {
        self
    }

    /// Follows `envelope` from `time` and frees the node once it is over.
    ///
    /// Bundles for an earlier release cannot be withdrawn from the server. Releasing again at
    /// an earlier time frees the node first, so the server drops whatever arrives later.
    fn release(&mut self, time: f64, envelope: &Envelope) {
        if self.freed {
            return;
        }
        self.last_time = time;
        envelope.apply(self, HorizontalTransform::shift(time), 10.0);
        self.free_at(Some(time + envelope.max_x()));
    }

    fn destroy(&mut self) {
        if !self.freed {
            self.free_at(None);
            self.freed = true;
        }
    }
}

fn osc_time(time: SystemTime) -> OscTime {
    const UNIX_OFFSET: u64 = 2_208_988_800; // From RFC 5905
    const TWO_POW_32: f64 = 4294967296.0;

    let unix_time = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let unix_offset = Duration::new(UNIX_OFFSET, 0);
    let epoch_time = unix_offset + unix_time;
    let ts_secs = epoch_time.as_secs() as u32;
    let ts_nanos = epoch_time.subsec_nanos() as f64;
    let ts_frac = ((ts_nanos * TWO_POW_32) / 1.0e9).round() as u32;
    (ts_secs, ts_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(100)
    }

    fn params() -> PlayableParams {
        PlayableParams {
            frequency: 440.0,
            start: 1.5,
            end: 2.0,
            vel: 1.0,
            pan: -0.5,
        }
    }

    fn bundle(packet: &OscPacket) -> &OscBundle {
        match packet {
            OscPacket::Bundle(bundle) => bundle,
            other => panic!("expected a bundle, got {:?}", other),
        }
    }

    fn message(packet: &OscPacket) -> &OscMessage {
        match packet {
            OscPacket::Message(message) => message,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn osc_time_counts_from_1900() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!((2_208_988_801, 2_147_483_648), osc_time(time));
    }

    #[test]
    fn create_node() {
        let transport = MemoryTransport::new();
        let mut generator = ScToneGenerator::new(transport.clone(), epoch())
            .synth_name("sine")
            .first_node_id(7);
        let node = generator.create_playable(params()).unwrap();
        assert_eq!(7, node.node_id());

        let packets = transport.packets().unwrap();
        let message = message(&packets[0]);
        assert_eq!("/s_new", message.addr);
        assert_eq!(
            vec![
                OscType::String("sine".to_owned()),
                OscType::Int(7),
                OscType::Int(0),
                OscType::Int(1),
                OscType::String("freq".to_owned()),
                OscType::Float(440.0),
                OscType::String("amp".to_owned()),
                OscType::Float(0.0),
                OscType::String("pan".to_owned()),
                OscType::Float(-0.5),
            ],
            message.args
        );

        let next = generator.create_playable(params()).unwrap();
        assert_eq!(8, next.node_id());
    }

    #[test]
    fn gain_changes_are_timestamped() {
        let transport = MemoryTransport::new();
        let mut generator = ScToneGenerator::new(transport.clone(), epoch());
        let mut node = generator.create_playable(params()).unwrap();
        transport.clear();

        node.gain().set_value_at_time(0.0, 1.5);
        node.gain().linear_ramp_to_value_at_time(1.0, 1.75);

        let packets = transport.packets().unwrap();
        assert_eq!(2, packets.len());

        let set = bundle(&packets[0]);
        assert_eq!(osc_time(epoch() + Duration::from_millis(1_500)), set.timetag);

        let ramp = bundle(&packets[1]);
        assert_eq!(set.timetag, ramp.timetag);
        assert_eq!(
            vec![
                OscType::Int(1000),
                OscType::String("amp".to_owned()),
                OscType::Float(1.0),
                OscType::String("lag".to_owned()),
                OscType::Float(0.25),
            ],
            message(&ramp.content[0]).args
        );
    }

    #[test]
    fn release_frees_after_envelope() {
        let transport = MemoryTransport::new();
        let mut generator = ScToneGenerator::new(transport.clone(), epoch());
        let mut node = generator.create_playable(params()).unwrap();
        transport.clear();

        node.release(2.0, &Envelope::release(0.5).unwrap());

        let packets = transport.packets().unwrap();
        let last = bundle(packets.last().unwrap());
        assert_eq!(osc_time(epoch() + Duration::from_millis(2_500)), last.timetag);
        assert_eq!("/n_free", message(&last.content[0]).addr);
    }

    #[test]
    fn destroy_frees_now_and_silences_node() {
        let transport = MemoryTransport::new();
        let mut generator = ScToneGenerator::new(transport.clone(), epoch());
        let mut node = generator.create_playable(params()).unwrap();
        transport.clear();

        node.destroy();
        node.destroy();
        node.release(2.0, &Envelope::release(0.5).unwrap());
        node.gain().set_value_at_time(1.0, 3.0);

        let packets = transport.packets().unwrap();
        assert_eq!(1, packets.len());
        let free = message(&packets[0]);
        assert_eq!("/n_free", free.addr);
        assert_eq!(vec![OscType::Int(1000)], free.args);
    }

    #[test]
    fn send_errors_fail_creation() {
        struct Broken;

        impl Transport for Broken {
            fn send(&mut self, _bytes: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::Other, "unreachable"))
            }
        }

        let mut generator = ScToneGenerator::new(Broken, epoch());
        assert!(matches!(
            generator.create_playable(params()),
            Err(Error::Send(_))
        ));
    }
}
