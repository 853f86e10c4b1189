mod args;
mod dhcp;
mod discover;
mod fingerprint;
mod helpers;
mod listen;
mod server;
mod transport;

use crate::args::Arguments;
use log::error;

pub fn init_log(verbosity: usize) {
    stderrlog::new()
        .module(module_path!())
        .verbosity(verbosity + 1)
        .init()
        .unwrap();
}

fn main() {
    let res = match args::Arguments::parse_args() {
        Arguments::Server(args) => {
            init_log(args.verbosity);
            server::main(args)
        }
        Arguments::Discover(args) => {
            init_log(args.verbosity);
            discover::main(args)
        }
        Arguments::Listen(args) => {
            init_log(args.verbosity);
            listen::main(args)
        }
    };

    if let Err(err) = res {
        error!("{}", err);
        std::process::exit(1);
    }
}
