//! Device simulator front end.
//!
//! Runs the firmware core on a [`SimBoard`] and serves its serial protocol
//! over TCP, so host-side tooling can talk to a device without hardware.
//! The simulated clock tracks wall time; the scheduler tick runs at the
//! same period a hardware timer would use.
//!
//! Options:
//!
//! - `--port N`      TCP port to listen on (default 4242)
//! - `--board NAME`  teensy41 (default), teensy40, mkr, samd_zero
//! - `--loopback A B`  wire pin A to pin B (repeatable), e.g. to connect a
//!   to-chip request line to a from-chip one for self-tests

use std::env;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::exit;
use std::time::{Duration, Instant};

use log::{info, warn};

use aerlink_core::boards::{self, BoardProfile};
use aerlink_core::{Device, SimBoard, EXEC_PRECISION_US};

fn profile_by_name(name: &str) -> Option<&'static BoardProfile> {
    match name {
        "teensy41" => Some(&boards::TEENSY41),
        "teensy40" => Some(&boards::TEENSY40),
        "mkr" => Some(&boards::MKR),
        "samd_zero" => Some(&boards::SAMD_ZERO),
        _ => None,
    }
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [options]", program);
    eprintln!("Options:");
    eprintln!("  --port N         TCP port to listen on (default 4242)");
    eprintln!("  --board NAME     teensy41 | teensy40 | mkr | samd_zero");
    eprintln!("  --loopback A B   Wire pin A to pin B (repeatable)");
    exit(2);
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage(&args[0]);
    }

    let port: u16 = args
        .iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(4242);
    let board_name = args
        .iter()
        .position(|a| a == "--board")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("teensy41");
    let profile = match profile_by_name(board_name) {
        Some(p) => p,
        None => {
            eprintln!("Unknown board '{}'", board_name);
            usage(&args[0]);
        }
    };

    let mut loopbacks: Vec<(u8, u8)> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--loopback" {
            let pair = args
                .get(i + 1)
                .and_then(|a| a.parse().ok())
                .zip(args.get(i + 2).and_then(|b| b.parse().ok()));
            match pair {
                Some(p) => loopbacks.push(p),
                None => usage(&args[0]),
            }
            i += 2;
        }
        i += 1;
    }

    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Cannot listen on port {}: {}", port, e);
            exit(1);
        }
    };
    info!("simulating {} on 127.0.0.1:{}", profile.name, port);

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(c) => c,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        info!("host connected from {}", peer);
        let mut board = SimBoard::new(profile);
        for &(a, b) in &loopbacks {
            board.wire(a, b);
        }
        // One device per connection: a hardware device also starts fresh
        // when the cable is replugged.
        let device = Device::new(board);
        if let Err(e) = serve(stream, device) {
            warn!("session ended: {}", e);
        } else {
            info!("host disconnected");
        }
    }
}

/// Bridge one TCP connection to the device until the host hangs up.
fn serve(mut stream: TcpStream, mut device: Device<SimBoard>) -> std::io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    let started = Instant::now();
    let mut buf = [0u8; 512];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => device.board_mut().push_serial_rx(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        // Slave the simulated clock to wall time, then run one firmware
        // iteration: main loop poll, scheduler tick, pin change interrupts.
        let elapsed = started.elapsed().as_micros() as u32;
        let now = device.board().clock_now();
        device.board_mut().advance_micros(elapsed.wrapping_sub(now));
        device.poll();
        device.tick();
        for pin in device.board_mut().take_changed() {
            device.pin_change(pin);
        }

        let tx = device.board_mut().take_serial_tx();
        if !tx.is_empty() {
            stream.write_all(&tx)?;
        }
        std::thread::sleep(Duration::from_micros(EXEC_PRECISION_US as u64));
    }
}
