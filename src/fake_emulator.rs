//! In-process stand-in for the FCEUX connector script, for tests.

use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::config::{RAM_PAGE_LEN, SCREEN_CHANNELS, SCREEN_HEADER_LEN};
use crate::transport::SessionEndpoint;

pub type Ram = [[u8; RAM_PAGE_LEN]; 8];
pub type AdvanceHook = Box<dyn FnMut(u64, &mut Ram) + Send>;

pub struct FakeState {
    pub commands: Vec<String>,
    pub ram: Ram,
    /// Restored by `cL<slot>`.
    pub saved_ram: Ram,
    pub frame: u64,
    pub screen_msg_len: usize,
    pub answer_screen: bool,
    pub answer_ram: bool,
    pub on_advance: Option<AdvanceHook>,
}

impl FakeState {
    /// Every pixel is `[0, f, f, f]` with `f = frame % 256`.
    fn screen_payload(&self) -> Vec<u8> {
        let mut payload = vec![0u8; SCREEN_HEADER_LEN];
        let f = (self.frame % 256) as u8;
        let pixels = (self.screen_msg_len - SCREEN_HEADER_LEN) / SCREEN_CHANNELS;
        for _ in 0..pixels {
            payload.extend_from_slice(&[0, f, f, f]);
        }
        payload
    }
}

pub struct FakeEmulator {
    endpoint: SessionEndpoint,
    state: Arc<Mutex<FakeState>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeEmulator {
    pub fn start(screen_msg_len: usize) -> Self {
        let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
        udp.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let screen_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let ram_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = SessionEndpoint::new(
            "127.0.0.1",
            udp.local_addr().unwrap().port(),
            screen_listener.local_addr().unwrap().port(),
            ram_listener.local_addr().unwrap().port(),
        );

        let state = Arc::new(Mutex::new(FakeState {
            commands: Vec::new(),
            ram: [[0u8; RAM_PAGE_LEN]; 8],
            saved_ram: [[0u8; RAM_PAGE_LEN]; 8],
            frame: 0,
            screen_msg_len,
            answer_screen: true,
            answer_ram: true,
            on_advance: None,
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let Some(mut screen) = accept_until_stopped(&screen_listener, &stop) else {
                    return;
                };
                let Some(mut ram) = accept_until_stopped(&ram_listener, &stop) else {
                    return;
                };
                serve(&udp, &mut screen, &mut ram, &state, &stop);
            })
        };

        Self {
            endpoint,
            state,
            stop,
            handle: Some(handle),
        }
    }

    pub fn endpoint(&self) -> SessionEndpoint {
        self.endpoint.clone()
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Sets one byte both live and in the save state.
    pub fn poke(&self, address: u16, value: u8) {
        self.with_state(|s| {
            let (block, offset) = (address as usize / 256, address as usize % 256);
            s.ram[block][offset] = value;
            s.saved_ram[block][offset] = value;
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.with_state(|s| s.commands.clone())
    }

    /// Fire-and-forget commands land asynchronously; poll for them.
    pub fn wait_for_commands(&self, n: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let cmds = self.commands();
            if cmds.len() >= n || Instant::now() > deadline {
                return cmds;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for FakeEmulator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_until_stopped(listener: &TcpListener, stop: &AtomicBool) -> Option<TcpStream> {
    listener.set_nonblocking(true).unwrap();
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((sock, _)) => {
                sock.set_nonblocking(false).unwrap();
                return Some(sock);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(5)),
            Err(_) => return None,
        }
    }
    None
}

fn serve(
    udp: &UdpSocket,
    screen: &mut TcpStream,
    ram: &mut TcpStream,
    state: &Mutex<FakeState>,
    stop: &AtomicBool,
) {
    let mut buf = [0u8; 64];
    while !stop.load(Ordering::SeqCst) {
        let n = match udp.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(_) => return,
        };
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        let mut s = state.lock().unwrap();
        s.commands.push(text.clone());
        match Command::parse(&text) {
            Some(Command::Advance(frames)) => {
                for _ in 0..frames {
                    s.frame += 1;
                    let frame = s.frame;
                    let FakeState {
                        on_advance,
                        ram: mem,
                        ..
                    } = &mut *s;
                    if let Some(hook) = on_advance.as_mut() {
                        hook(frame, mem);
                    }
                }
            }
            Some(Command::LoadState(_)) => {
                s.ram = s.saved_ram;
                s.frame = 0;
            }
            Some(Command::RequestScreen) if s.answer_screen => {
                let payload = s.screen_payload();
                let _ = screen.write_all(&payload);
            }
            Some(Command::RequestRam(block)) if s.answer_ram => {
                let page = s.ram[block as usize % 8];
                let _ = ram.write_all(&page);
            }
            _ => {}
        }
    }
}
