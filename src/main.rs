//! Top-level wiring (§2.1/§6.1): loads the TOML config, builds one input
//! source and its attached handlers per `[[input]]`/`[[handler]]` table,
//! starts everything, and waits for `SIGINT`/`SIGTERM` (or, under `--once`,
//! runs file-backed sources to completion and prints each handler's current
//! snapshot). Follows the teacher-adjacent `Cli`/`tracing_subscriber::fmt`/
//! `AppConfig::from_file` shape used across the pack's monitoring binaries.

mod config;
mod dns;
mod error;
mod filter;
mod handler;
mod host_matcher;
mod input;
mod metrics;
mod packet;
mod signals;
mod sketches;
mod tcp_reassembler;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};

use config::{AppConfig, HandlerType, PcapSource};
use dns::MatcherConfig;
use filter::FilterConfig;
use handler::{DnsHandler, DnsHandlerConfig, NetHandler};
use host_matcher::HostMatcher;
use input::capture_file::{CaptureFile, CaptureFileConfig};
use input::dnstap_file::{DnstapFile, DnstapFileConfig};
use input::dnstap_socket::{DnstapSocket, DnstapSocketConfig};
use input::live_interface::{LiveInterface, LiveInterfaceConfig};
use input::mock_generator::{MockGenerator, MockGeneratorConfig};
use input::{InputSignals, InputSource, SharedSignals};
use metrics::WindowConfig;
use packet::Timestamp;
use tcp_reassembler::ReassemblerConfig;

/// A passive network observability engine: DNS transaction metrics without
/// full packet retention.
#[derive(Parser, Debug)]
#[command(name = "netvisor", version, about)]
struct Cli {
    /// Path to the TOML configuration file (§6).
    #[arg(short, long)]
    config: PathBuf,

    /// Run every file-backed source to completion, print each handler's
    /// current snapshot as JSON, and exit (§6.1).
    #[arg(long)]
    once: bool,

    /// Increase log verbosity (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "netvisor=warn",
        1 => "netvisor=info",
        _ => "netvisor=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

/// Either handler kind, so the wiring/shutdown/snapshot loops below don't
/// need to care which one a given `[[handler]]` table produced.
enum HandlerHandle {
    Dns(DnsHandler),
    Net(NetHandler),
}

impl HandlerHandle {
    fn current_snapshot(&self) -> Value {
        match self {
            HandlerHandle::Dns(h) => h.current_snapshot(),
            HandlerHandle::Net(h) => h.current_snapshot(),
        }
    }

    fn stop(&mut self) {
        match self {
            HandlerHandle::Dns(h) => h.stop(),
            HandlerHandle::Net(h) => h.stop(),
        }
    }
}

/// Builds the concrete `InputSource` a `[[input]]` table describes.
/// Priority mirrors §6's field list: an explicit file wins over a live
/// device, and `pcap_source = "mock"` wins over a configured `iface` so a
/// demo config doesn't accidentally need a real capture device.
fn build_input(
    cfg: &config::InputConfig,
    host_matcher: HostMatcher,
) -> error::Result<Box<dyn InputSource>> {
    if let Some(path) = &cfg.dnstap_file {
        return Ok(Box::new(DnstapFile::new(DnstapFileConfig {
            path: path.clone(),
        })));
    }
    if let Some(path) = &cfg.socket {
        return Ok(Box::new(DnstapSocket::new(DnstapSocketConfig {
            path: path.clone(),
        })));
    }
    if cfg.pcap_source == PcapSource::Mock {
        return Ok(Box::new(MockGenerator::new(MockGeneratorConfig {
            host_matcher,
        })));
    }
    if let Some(path) = &cfg.pcap_file {
        return Ok(Box::new(CaptureFile::new(CaptureFileConfig {
            path: path.clone(),
            bpf: cfg.bpf.clone(),
            host_matcher,
            sflow_collector_port: cfg.sflow_collector_port,
        })));
    }
    if let Some(iface) = &cfg.iface {
        let mut live_cfg = LiveInterfaceConfig::new(iface.clone(), host_matcher);
        live_cfg.bpf = cfg.bpf.clone();
        live_cfg.sflow_collector_port = cfg.sflow_collector_port;
        return Ok(Box::new(LiveInterface::new(live_cfg)));
    }

    error::ConfigSnafu {
        message: format!(
            "input '{}' names no pcap_file, iface, dnstap_file, or socket",
            cfg.name
        ),
    }
    .fail()
}

fn filter_config_for(handler: &config::HandlerConfig) -> FilterConfig {
    FilterConfig {
        exclude_noerror: handler.exclude_noerror,
        only_rcode: handler.only_rcode,
        only_qname_suffix: handler.only_qname_suffix.clone(),
        only_qtype: handler.only_qtype.clone(),
        answer_count: handler.answer_count,
        geoloc_notfound: false,
        asn_notfound: false,
    }
}

fn window_config_for(handler: &config::HandlerConfig) -> WindowConfig {
    WindowConfig {
        num_periods: handler.num_periods as usize,
        period_length_secs: handler.period_length_secs,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "starting netvisor");

    let app_config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let mut inputs: Vec<(String, Box<dyn InputSource>, SharedSignals)> = Vec::new();
    for input_cfg in &app_config.inputs {
        let host_matcher = HostMatcher::parse(&input_cfg.host_spec)
            .map_err(|e| anyhow!("input '{}' has an invalid host_spec: {e}", input_cfg.name))?;
        let source = build_input(input_cfg, host_matcher)?;
        let signals: SharedSignals = Arc::new(Mutex::new(InputSignals::default()));
        inputs.push((input_cfg.name.clone(), source, signals));
    }

    let signals_by_input: HashMap<String, SharedSignals> = inputs
        .iter()
        .map(|(name, _, signals)| (name.clone(), Arc::clone(signals)))
        .collect();

    let host_specs: HashMap<String, String> = app_config
        .inputs
        .iter()
        .map(|i| (i.name.clone(), i.host_spec.clone()))
        .collect();

    let start_ts = Timestamp::now();
    let mut handlers: Vec<(String, HandlerHandle)> = Vec::new();
    let mut dns_handlers_by_input: HashMap<String, usize> = HashMap::new();

    for handler_cfg in app_config.handlers.iter().filter(|h| h.kind == HandlerType::Dns) {
        let signals = signals_by_input
            .get(&handler_cfg.input)
            .expect("config validation guarantees the input exists");
        let host_spec = host_specs.get(&handler_cfg.input).cloned().unwrap_or_default();
        let dns_config = DnsHandlerConfig {
            filter: filter_config_for(handler_cfg),
            matcher: MatcherConfig::default(),
            reassembler: ReassemblerConfig::default(),
            host_matcher: HostMatcher::parse(&host_spec).unwrap_or_default(),
        };
        let mut dns_handler = DnsHandler::new(dns_config, window_config_for(handler_cfg), start_ts);
        dns_handler.start(signals);
        dns_handlers_by_input.insert(handler_cfg.input.clone(), handlers.len());
        handlers.push((
            format!("dns:{}", handler_cfg.input),
            HandlerHandle::Dns(dns_handler),
        ));
    }

    for handler_cfg in app_config.handlers.iter().filter(|h| h.kind == HandlerType::Net) {
        let signals = signals_by_input
            .get(&handler_cfg.input)
            .expect("config validation guarantees the input exists");
        let mut net_handler = NetHandler::new(window_config_for(handler_cfg), start_ts);
        if handler_cfg.upstream_dns_handler {
            let idx = *dns_handlers_by_input
                .get(&handler_cfg.input)
                .expect("config validation guarantees a sibling dns handler exists");
            let HandlerHandle::Dns(dns_handler) = &handlers[idx].1 else {
                unreachable!("dns_handlers_by_input only records Dns entries");
            };
            net_handler.attach_behind_dns_filter(dns_handler);
        } else {
            net_handler.attach(signals);
        }
        handlers.push((
            format!("net:{}", handler_cfg.input),
            HandlerHandle::Net(net_handler),
        ));
    }

    for (name, source, signals) in inputs.iter_mut() {
        info!(input = %name, "starting input source");
        source.start(Arc::clone(signals))?;
    }

    if cli.once {
        for (name, source, _) in inputs.iter_mut() {
            debug!(input = %name, "stopping input source after one-shot run");
            source.stop();
        }
        for (label, handler) in &handlers {
            let snapshot = handler.current_snapshot();
            println!("{}", serde_json::json!({ "handler": label, "metrics": snapshot }));
        }
        return Ok(());
    }

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping sources and handlers");

    for (name, source, _) in inputs.iter_mut() {
        debug!(input = %name, "stopping input source");
        source.stop();
    }
    for (label, handler) in handlers.iter_mut() {
        debug!(handler = %label, "stopping handler");
        handler.stop();
    }

    Ok(())
}
