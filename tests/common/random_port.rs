use lazy_static::lazy_static;

use std::sync::Mutex;

const STARTING_PORT: u16 = 21000;

pub struct PseudoRandomMemcdPort {
    port: u16,
}

impl PseudoRandomMemcdPort {
    pub fn new() -> PseudoRandomMemcdPort {
        PseudoRandomMemcdPort {
            port: STARTING_PORT,
        }
    }

    pub fn get_next_port(&mut self) -> u16 {
        self.port += 10;
        self.port
    }
}

lazy_static! {
    pub static ref pseudo_random_port: Mutex<PseudoRandomMemcdPort> =
        Mutex::new(PseudoRandomMemcdPort::new());
}
