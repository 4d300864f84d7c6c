use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::{RuntimeProvider, TokioConnectionProvider, TokioRuntimeProvider};
use hickory_resolver::proto::runtime::TokioTime;
use hickory_resolver::TokioResolver;
use tokio_socks::tcp::Socks5Stream;
use url::Url;

/// A DNS resolver built for one invocation. SOCKS5 proxies get a
/// TCP-only resolver whose TCP connections are dialed *through* the
/// proxy, so raw DNS traffic never silently leaks outside the tunnel; any
/// other proxy configuration falls back to the system resolver, since
/// only SOCKS5 can tunnel raw DNS.
pub enum Resolver {
	System(TokioResolver),
	Socks5Tunnelled(TokioResolver),
}

impl Resolver {
	pub fn is_socks5(&self) -> bool {
		matches!(self, Resolver::Socks5Tunnelled(_))
	}

	pub fn inner(&self) -> &TokioResolver {
		match self {
			Resolver::System(r) => r,
			Resolver::Socks5Tunnelled(r) => r,
		}
	}
}

/// A `RuntimeProvider` that forwards UDP/timers to the stock Tokio
/// provider but dials every TCP connection through a fixed SOCKS5 proxy.
/// This is the piece that actually prevents a DNS leak: without it a
/// "SOCKS5-aware" resolver would just be an ordinary resolver that knows
/// a proxy URL exists.
#[derive(Clone)]
struct Socks5RuntimeProvider {
	inner: TokioRuntimeProvider,
	proxy: SocketAddr,
}

impl RuntimeProvider for Socks5RuntimeProvider {
	type Handle = <TokioRuntimeProvider as RuntimeProvider>::Handle;
	type Timer = TokioTime;
	type Udp = <TokioRuntimeProvider as RuntimeProvider>::Udp;
	type Tcp = tokio_util::compat::Compat<Socks5Stream<tokio::net::TcpStream>>;

	fn create_handle(&self) -> Self::Handle {
		self.inner.create_handle()
	}

	fn connect_tcp(
		&self,
		server_addr: SocketAddr,
		_bind_addr: Option<SocketAddr>,
		_timeout: Option<Duration>,
	) -> Pin<Box<dyn Future<Output = std::io::Result<Self::Tcp>> + Send>> {
		let proxy = self.proxy;
		Box::pin(async move {
			let stream = Socks5Stream::connect(proxy, server_addr)
				.await
				.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
			Ok(tokio_util::compat::TokioAsyncReadCompatExt::compat(stream))
		})
	}

	fn bind_udp(
		&self,
		local_addr: SocketAddr,
		server_addr: SocketAddr,
	) -> Pin<Box<dyn Future<Output = std::io::Result<Self::Udp>> + Send>> {
		// SOCKS5 cannot tunnel raw UDP for our purposes (no UDP ASSOCIATE
		// support here); lookups are forced to TCP via ResolverOpts so this
		// path is never exercised in practice, but it must still type-check.
		self.inner.bind_udp(local_addr, server_addr)
	}
}

pub struct ResolverFactory;

impl ResolverFactory {
	/// `proxy` is the explicit `--proxy` value, already merged with
	/// `ALL_PROXY`/`all_proxy` precedence by the caller (the config
	/// layer), matching the `resolve_proxy` display-resolver's inputs.
	pub fn build(proxy: Option<&str>) -> Resolver {
		let effective = proxy
			.map(str::to_string)
			.or_else(|| std::env::var("ALL_PROXY").ok())
			.or_else(|| std::env::var("all_proxy").ok());

		match effective.as_deref().and_then(|p| Url::parse(p).ok()) {
			Some(url) if url.scheme() == "socks5" => {
				let Some(proxy_addr) = socket_addr_of(&url) else {
					return Resolver::System(system_resolver());
				};

				// Force the pure-software TCP path so the custom dialer is
				// always the one actually exercised, never a platform
				// resolver shortcut.
				let mut opts = ResolverOpts::default();
				opts.try_tcp_on_error = true;

				let nameserver_host = std::net::Ipv4Addr::new(9, 9, 9, 9);
				let mut group = NameServerConfigGroup::from_ips_clear(&[nameserver_host.into()], 53, true);
				for ns in group.iter_mut() {
					ns.protocol = Protocol::Tcp;
				}
				let config = ResolverConfig::from_parts(None, vec![], group);

				let provider = Socks5RuntimeProvider {
					inner: TokioRuntimeProvider::new(),
					proxy: proxy_addr,
				};
				let connector = TokioConnectionProvider::new(provider);
				let mut builder = hickory_resolver::Resolver::builder_with_config(config, connector);
				*builder.options_mut() = opts;
				Resolver::Socks5Tunnelled(builder.build())
			},
			_ => Resolver::System(system_resolver()),
		}
	}
}

fn socket_addr_of(url: &Url) -> Option<SocketAddr> {
	let host = url.host_str()?;
	let port = url.port().unwrap_or(1080);
	format!("{host}:{port}").parse().ok()
}

fn system_resolver() -> TokioResolver {
	hickory_resolver::Resolver::builder_tokio()
		.unwrap_or_else(|_| {
			hickory_resolver::Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
		})
		.build()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_proxy_yields_system_resolver() {
		let resolver = ResolverFactory::build(None);
		assert!(!resolver.is_socks5());
	}

	#[test]
	fn http_proxy_does_not_tunnel_dns() {
		let resolver = ResolverFactory::build(Some("http://127.0.0.1:8080"));
		assert!(!resolver.is_socks5());
	}

	#[test]
	fn socks5_proxy_yields_tunnelled_resolver() {
		let resolver = ResolverFactory::build(Some("socks5://127.0.0.1:9050"));
		assert!(resolver.is_socks5());
	}
}
