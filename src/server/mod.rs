mod config;
mod cycle;

pub use config::{generate_offer_config, OfferConfig};
pub use cycle::{new_ack, new_offer, run_cycle, AbortReason, CycleOutcome};

use crate::args;
use crate::dhcp::{self, join};
use crate::helpers::is_privileged_user;
use crate::transport::UdpDhcpSocket;
use log::{error, info, warn};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn main(args: args::server::Arguments) -> Result<(), String> {
    if !is_privileged_user() {
        return Err(format!(
            "Root privileges are required to bind UDP port {}",
            dhcp::DHCP_SERVER_PORT
        ));
    }

    let config = generate_offer_config(&args)?;

    info!("Server: {}", config.server_ip);
    info!("Router: {}", config.router);
    info!("Mask: {}", config.net_mask);
    info!("DNS: {}", join(&config.domain_servers, ","));
    info!("Offer: {}", config.offer_ip);
    info!("Lease: {}s", config.lease_time);

    let mut socket = UdpDhcpSocket::open(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, dhcp::DHCP_SERVER_PORT),
        Some(&args.iface.name),
    )
    .map_err(|e| format!("{}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    let run_c = running.clone();

    ctrlc::set_handler(move || {
        run_c.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    info!("Waiting for DHCP discoveries...");

    while running.load(Ordering::SeqCst) {
        match run_cycle(&mut socket, &config, &running) {
            Ok(CycleOutcome::Done) => {
                info!("Negotiation completed");
            }
            Ok(CycleOutcome::Aborted(AbortReason::Cancelled)) => {
                break;
            }
            Ok(CycleOutcome::Aborted(reason)) => {
                warn!("Negotiation aborted: {}", reason);
            }
            Err(e) => {
                error!("Error during negotiation: {}", e);
            }
        }

        if args.once {
            break;
        }
    }

    return Ok(());
}
