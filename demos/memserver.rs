//
//  Sample application.
//
//  Serves an in-memory storage on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;

use clap::Parser;
use futures_util::future::TryFutureExt;

use dav_engine::{body::Body, DavHandler, LockSystem, MemStorage};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// base URI to serve below
    #[arg(short, long, default_value = "")]
    base: String,
    /// refuse to store more than this many bytes
    #[arg(short, long)]
    quota: Option<u64>,
    /// leave locking to the storage (which never locks)
    #[arg(long)]
    no_locks: bool,
    /// do not compress responses
    #[arg(long)]
    no_gzip: bool,
}

async fn handle(
    dh: DavHandler,
    req: hyper::Request<hyper::Body>,
) -> Result<hyper::Response<Body>, Infallible> {
    Ok(dh.handle(req).await)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let storage = match cli.quota {
        Some(bytes) => MemStorage::with_quota(bytes),
        None => MemStorage::new(),
    };
    let locks = if cli.no_locks {
        LockSystem::Storage
    } else {
        LockSystem::Mem
    };

    let dav_server = DavHandler::builder(storage)
        .strip_prefix(cli.base.clone())
        .locksystem(locks)
        .gzip(!cli.no_gzip)
        .build();

    let make_service = hyper::service::make_service_fn(|_| {
        let dav_server = dav_server.clone();
        async move {
            let func = move |req| handle(dav_server.clone(), req);
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let server = hyper::Server::try_bind(&addr)?
        .serve(make_service)
        .map_err(|e| eprintln!("server error: {}", e));

    println!("Serving memory storage{} on {}", cli.base, cli.port);
    let _ = server.await;
    Ok(())
}
