//! Command line arguments and the configuration derived from them.

use crate::events::PeerInfo;
use clap::{Parser, ValueEnum};
use shared::{PeerAddress, TICK_RATE};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Listen for players and start the game once they joined
    Host,
    /// Connect to a host and wait for it to start the game
    Join,
    /// Play alone without networking
    Solo,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// What this peer does
    #[arg(value_enum, default_value = "solo")]
    pub mode: Mode,

    /// Address to accept players on
    #[arg(short = 'l', long, default_value = "127.0.0.1:7000")]
    pub listen: String,

    /// Host address to connect to in join mode
    #[arg(short = 'c', long)]
    pub connect: Option<String>,

    /// Stable peer id announced to other players (defaults to the listen address)
    #[arg(long)]
    pub id: Option<String>,

    /// Display name announced to other players
    #[arg(short = 'n', long, default_value = "player")]
    pub name: String,

    /// Players including the host; the host starts once all have joined
    #[arg(short = 'p', long, default_value = "2")]
    pub players: u32,

    /// Tick rate (updates per second)
    #[arg(short = 't', long, default_value_t = TICK_RATE)]
    pub tick_rate: u32,

    /// Known peer reported by discovery, as NAME=ADDRESS (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Press random keys instead of idling
    #[arg(short = 'a', long)]
    pub autoplay: bool,

    /// Seed for shape randomization
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Everything the library needs to run one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    pub mode: Mode,
    pub listen: String,
    pub connect: Option<PeerAddress>,
    pub local: PeerInfo,
    pub players: u32,
    pub tick_rate: u32,
    pub known_peers: Vec<PeerInfo>,
    pub autoplay: bool,
    pub seed: Option<u64>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        let listen = "127.0.0.1:7000".to_string();
        Self {
            mode: Mode::Solo,
            local: PeerInfo::new(listen.as_str(), "player"),
            listen,
            connect: None,
            players: 2,
            tick_rate: TICK_RATE,
            known_peers: Vec::new(),
            autoplay: false,
            seed: None,
        }
    }
}

impl PeerConfig {
    /// Configuration for a peer listening on `listen` and known by that
    /// address.
    pub fn local(listen: &str, name: &str) -> Self {
        Self {
            listen: listen.to_string(),
            local: PeerInfo::new(listen, name),
            ..Self::default()
        }
    }
}

impl TryFrom<Args> for PeerConfig {
    type Error = String;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.mode == Mode::Join && args.connect.is_none() {
            return Err("join mode needs --connect <ADDRESS>".to_string());
        }
        if args.players == 0 {
            return Err("--players must be at least 1".to_string());
        }
        if args.tick_rate == 0 {
            return Err("--tick-rate must be positive".to_string());
        }

        let known_peers = args
            .peers
            .iter()
            .map(|entry| parse_peer(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let id = args.id.unwrap_or_else(|| args.listen.clone());

        Ok(Self {
            mode: args.mode,
            local: PeerInfo::new(id, args.name),
            listen: args.listen,
            connect: args.connect.map(PeerAddress::from),
            players: args.players,
            tick_rate: args.tick_rate,
            known_peers,
            autoplay: args.autoplay,
            seed: args.seed,
        })
    }
}

fn parse_peer(entry: &str) -> Result<PeerInfo, String> {
    match entry.split_once('=') {
        Some((name, address)) if !name.is_empty() && !address.is_empty() => {
            Ok(PeerInfo::new(address, name))
        }
        _ => Err(format!("invalid peer '{}', expected NAME=ADDRESS", entry)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<PeerConfig, String> {
        let args = Args::try_parse_from(argv).map_err(|e| e.to_string())?;
        PeerConfig::try_from(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["peer"]).unwrap();
        assert_eq!(config.mode, Mode::Solo);
        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.local.address, PeerAddress::from("127.0.0.1:7000"));
        assert_eq!(config.players, 2);
        assert_eq!(config.tick_rate, 40);
        assert!(!config.autoplay);
        assert_eq!(config, PeerConfig::default());
    }

    #[test]
    fn test_join_requires_connect() {
        assert!(parse(&["peer", "join"]).is_err());
        let config = parse(&["peer", "join", "--connect", "10.0.0.2:7000"]).unwrap();
        assert_eq!(config.connect, Some(PeerAddress::from("10.0.0.2:7000")));
    }

    #[test]
    fn test_host_options() {
        let config = parse(&[
            "peer", "host", "-l", "0.0.0.0:7100", "--id", "alpha", "-n", "Alice", "-p", "3",
            "--seed", "9",
        ])
        .unwrap();
        assert_eq!(config.mode, Mode::Host);
        assert_eq!(config.listen, "0.0.0.0:7100");
        assert_eq!(config.local, PeerInfo::new("alpha", "Alice"));
        assert_eq!(config.players, 3);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn test_known_peers() {
        let config = parse(&[
            "peer",
            "--peer",
            "bob=127.0.0.1:7001",
            "--peer",
            "carol=127.0.0.1:7002",
        ])
        .unwrap();
        assert_eq!(
            config.known_peers,
            vec![
                PeerInfo::new("127.0.0.1:7001", "bob"),
                PeerInfo::new("127.0.0.1:7002", "carol"),
            ]
        );
        assert!(parse(&["peer", "--peer", "nobody"]).is_err());
    }

    #[test]
    fn test_zero_tick_rate_is_rejected() {
        assert!(parse(&["peer", "-t", "0"]).is_err());
    }
}
