use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use relay_proto::types::{DEFAULT_PORT, MAX_FILE_SIZE};

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "relayd")]
#[command(about = "Broadcast chat relay server")]
#[command(version)]
pub struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,
    /// Address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0", env = "RELAYD_HOST")]
    pub host: IpAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "RELAYD_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "RELAYD_MAX_CONNS")]
    pub max_conns: usize,
    /// Per-connection outbound queue depth (messages buffered for a slow
    /// receiver before broadcasts to it are dropped).
    #[arg(long, default_value = "256", env = "RELAYD_SEND_QUEUE")]
    pub send_queue: usize,
    /// Maximum WebSocket frame size in bytes.
    #[arg(long, default_value = "33554432", env = "RELAYD_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "RELAYD_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "300", env = "RELAYD_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Per-connection outbound queue depth.
    pub send_queue: usize,
    /// Maximum WebSocket frame size in bytes.
    pub max_frame_bytes: usize,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.send_queue == 0 {
            return Err("send_queue must be greater than 0".to_string());
        }
        if self.send_queue > 65_536 {
            return Err("send_queue exceeds reasonable limit (65,536)".to_string());
        }

        // A maximal legal file is 10 MiB, which base64-expands by 4/3 and
        // then gains envelope overhead; the frame cap must admit it.
        let min_frame = MAX_FILE_SIZE / 3 * 4 + 4096;
        if self.max_frame_bytes < min_frame {
            return Err(format!(
                "max_frame_bytes too small to carry a maximum-size file (need at least {min_frame} bytes)"
            ));
        }
        if self.max_frame_bytes > 128 * 1024 * 1024 {
            return Err("max_frame_bytes exceeds reasonable limit (128 MiB)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }
        if self.idle_timeout < self.ping_interval {
            return Err("idle_timeout must be at least ping_interval".to_string());
        }

        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: SocketAddr::new(args.host, args.port),
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            send_queue: args.send_queue,
            max_frame_bytes: args.max_frame_bytes,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            metrics_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090),
            max_conns: 10_000,
            send_queue: 256,
            max_frame_bytes: 32 * 1024 * 1024,
            ping_interval: 30,
            idle_timeout: 300,
        }
    }
}
