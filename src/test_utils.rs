//! Test utilities: a loopback fake drone and synthetic traffic generators.
//!
//! [`FakeDrone`] binds a UDP socket on `127.0.0.1`, records every command it
//! receives and answers according to per-command rules (default: `ok`). It
//! can also push telemetry and video datagrams at a running link.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::types::START_CODE;

/// How the fake drone answers one command.
#[derive(Debug, Clone)]
enum Behaviour {
    Reply { text: String, delay: Duration },
    Silent,
}

/// Scripted stand-in for the drone's control port.
pub struct FakeDrone {
    addr: SocketAddr,
    pusher: UdpSocket,
    rules: Arc<Mutex<HashMap<String, Behaviour>>>,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FakeDrone {
    /// Bind on an ephemeral loopback port and start answering.
    pub async fn start() -> Self {
        let socket =
            Arc::new(UdpSocket::bind(loopback(0)).await.expect("fake drone control socket"));
        let pusher = UdpSocket::bind(loopback(0)).await.expect("fake drone push socket");
        let addr = socket.local_addr().expect("fake drone address");
        let rules = Arc::new(Mutex::new(HashMap::new()));
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(serve(socket, Arc::clone(&rules), Arc::clone(&received)));
        Self { addr, pusher, rules, received, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Link configuration pointing at this drone, with every local socket on
    /// an ephemeral loopback port.
    pub fn link_config(&self, timeout_ms: u64) -> LinkConfig {
        let mut config = LinkConfig::default();
        config.drone_host = self.addr.ip();
        config.command.port = self.addr.port();
        config.command.bind = loopback(0);
        config.command.timeout_ms = timeout_ms;
        config.telemetry.bind = loopback(0);
        config.video.bind = loopback(0);
        config
    }

    pub fn reply_with(&self, command: &str, reply: &str) {
        self.reply_after(command, reply, Duration::ZERO);
    }

    pub fn reply_after(&self, command: &str, reply: &str, delay: Duration) {
        self.rules
            .lock()
            .unwrap()
            .insert(command.to_string(), Behaviour::Reply { text: reply.to_string(), delay });
    }

    pub fn stay_silent(&self, command: &str) {
        self.rules.lock().unwrap().insert(command.to_string(), Behaviour::Silent);
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Push one datagram at a link socket.
    pub async fn push(&self, to: SocketAddr, datagram: &[u8]) {
        self.pusher.send_to(datagram, to).await.expect("fake drone push");
    }
}

impl Drop for FakeDrone {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    rules: Arc<Mutex<HashMap<String, Behaviour>>>,
    received: Arc<Mutex<Vec<String>>>,
) {
    let mut buf = [0u8; 1024];
    loop {
        let Ok((len, from)) = socket.recv_from(&mut buf).await else {
            continue;
        };
        let command = String::from_utf8_lossy(&buf[..len]).to_string();
        received.lock().unwrap().push(command.clone());

        let behaviour = rules
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or(Behaviour::Reply { text: "ok".into(), delay: Duration::ZERO });

        if let Behaviour::Reply { text, delay } = behaviour {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = socket.send_to(text.as_bytes(), from).await;
            });
        }
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// A realistic full state datagram.
pub fn sample_telemetry() -> &'static [u8] {
    concat!(
        "mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:1;roll:-2;yaw:-45;vgx:0;vgy:0;vgz:0;",
        "templ:62;temph:65;tof:10;h:0;bat:87;baro:183.34;time:0;",
        "agx:-3.00;agy:-32.00;agz:-999.00;\r\n"
    )
    .as_bytes()
}

/// Synthetic H.264-like traffic: `frames` groups of `nal_per_frame`
/// start-code-prefixed units, each unit split across `fragments_per_nal`
/// datagrams.
pub fn synthetic_video(
    frames: usize,
    nal_per_frame: usize,
    fragments_per_nal: usize,
) -> Vec<Vec<u8>> {
    let mut datagrams = Vec::new();
    for frame in 0..frames {
        for nal in 0..nal_per_frame {
            let header = if frame == 0 && nal == 0 { 0x67 } else { 0x41 };
            let mut unit = START_CODE.to_vec();
            unit.push(header);
            unit.extend((0..fragments_per_nal * 700).map(|i| (i % 251) as u8 | 0x02));

            let chunk = unit.len().div_ceil(fragments_per_nal.max(1));
            datagrams.extend(unit.chunks(chunk).map(<[u8]>::to_vec));
        }
    }
    datagrams
}
