use rand::Rng;

mod params_builder;
mod random_port;
mod server;
mod wire;

pub use params_builder::MemcdServerParamsBuilder;
pub use server::spawn_server;
#[allow(unused_imports)]
pub use wire::{binary_request, read_binary_response, BinaryResponsePacket, TextClient};

#[allow(dead_code)]
pub fn create_value_with_size(size: usize) -> String {
    let mut rng = rand::rng();
    let mut value = String::with_capacity(size);
    for _ in 0..size {
        let random_char = rng.random_range(b'a'..=b'z') as char;
        value.push(random_char);
    }
    value
}
