use clap::Parser;
use color_eyre::Result;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use jlcstock::cache::SqliteStore;
use jlcstock::parts::{ExchangeRate, FetchError, LcscPart, PartResult, ReqwestTransport};
use jlcstock::render::cells::price_content;
use jlcstock::render::CellContent;
use jlcstock::{logging, Config, PartsService};

#[derive(Parser, Debug)]
#[command(name = "jlcstock")]
#[command(about = "Look up JLCPCB stock and pricing for LCSC part numbers")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jlcstock/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Currency to convert prices into (e.g. EUR)
  #[arg(long)]
  currency: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Also list each part's LCSC attributes
  #[arg(short, long)]
  attributes: bool,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  /// LCSC part numbers (e.g. C25804)
  #[arg(required = true)]
  parts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let currency = args.currency.or_else(|| config.exchange.currency.clone());

  let store = Arc::new(SqliteStore::open()?);
  let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
  let service = PartsService::new(&config, store, transport);
  service.load()?;
  let flush_task = service.spawn_flush_task(config.cache.flush_interval());

  let rate = match currency {
    Some(code) => {
      service.exchange().set_currency(&code);
      match service.exchange().resolve().await {
        Ok(rate) => Some(rate),
        Err(e) => {
          eprintln!("Exchange rate unavailable, showing USD: {}", e);
          None
        }
      }
    }
    None => None,
  };

  let with_attributes = args.attributes;
  let lookups = args.parts.iter().map(|part| {
    let service = service.clone();
    async move {
      let attributes = if with_attributes {
        Some(service.attributes().fetch(part).await)
      } else {
        None
      };
      (part, service.parts().fetch(part).await, attributes)
    }
  });
  for (part, result, attributes) in join_all(lookups).await {
    print_part(part, &result, rate.as_ref());
    if let Some(attributes) = attributes {
      print_attributes(&attributes);
    }
  }

  flush_task.abort();
  if service.flush()? {
    debug!("Part cache saved");
  }
  Ok(())
}

fn print_part(part: &str, result: &PartResult, rate: Option<&ExchangeRate>) {
  match result {
    Ok(Some(detail)) => {
      println!("{}  stock: {}", part, detail.stock_count);
      match price_content(result, rate) {
        CellContent::Prices {
          symbol,
          lines,
          minimum,
        } => {
          for line in lines {
            println!("  {:>8}+  {}{}", line.quantity, symbol, line.unit_price);
          }
          if let Some(min) = minimum {
            let price = min
              .price
              .map(|p| format!(" ({}{})", symbol, p))
              .unwrap_or_default();
            println!("  min: {}{}", min.quantity, price);
            if let Some(loss) = min.loss {
              println!("  loss: {}", loss);
            }
          }
        }
        _ => println!("  no price data"),
      }
    }
    Ok(None) => println!("{}  N/A (not stocked by JLCPCB)", part),
    Err(e) => println!("{}  lookup failed: {}", part, e),
  }
}

fn print_attributes(result: &Result<Option<LcscPart>, FetchError>) {
  match result {
    Ok(Some(part)) => {
      for (name, value) in part.attribute_lines() {
        println!("  {:<24}{}", name, value);
      }
    }
    Ok(None) => {}
    Err(e) => println!("  attributes unavailable: {}", e),
  }
}
