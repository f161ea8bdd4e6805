use std::process::ExitCode;
use std::sync::Arc;

use paper_trader::config::ClientConfig;
use paper_trader::history::TradeHistorySummary;
use paper_trader::logging::{LoggingConfig, init_logging};
use paper_trader::machine::snapshot::Snapshot;
use paper_trader::machine::transition::parse_quantity;
use paper_trader::remote::HttpPortfolioService;
use paper_trader::types::stock::Stock;
use paper_trader::valuation::position_value;
use paper_trader::{Session, TradeAction, TradingError, TradingStateMachine};

const USAGE: &str = "usage: paper-trader <command>

commands:
  positions                 list held positions
  watchlist                 list watched stocks
  quote SYMBOL              show the latest quote
  buy SYMBOL QTY [PRICE]    buy shares (market price when PRICE is omitted)
  sell SYMBOL QTY           sell shares
  watch SYMBOL [NOTE]       add a stock to the watchlist
  unwatch SYMBOL            remove a stock from the watchlist
  note SYMBOL [NOTE]        change the note of a watched stock
  history                   list past trades
  summary                   portfolio totals";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = init_logging(&LoggingConfig::from_env()) {
        eprintln!("failed to initialise logging: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "help" || args[0] == "--help" {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let token = config
        .api_token
        .clone()
        .ok_or("PAPER_API_TOKEN must be set")?;
    let session = Session::new(token)?;
    let service = HttpPortfolioService::new(&config.api_url, config.request_timeout)?;
    let machine = TradingStateMachine::new(Arc::new(service), session, config.machine_options());

    let snapshot = machine.refresh().await?;
    tracing::info!(
        positions = snapshot.positions().count(),
        watched = snapshot.watchlist().count(),
        "portfolio loaded"
    );

    let command = args[0].as_str();
    let rest = &args[1..];
    match command {
        "positions" => {
            machine.refresh_tracked_quotes().await;
            print_positions(&machine, &snapshot);
        }
        "watchlist" => {
            machine.refresh_tracked_quotes().await;
            print_watchlist(&machine, &snapshot);
        }
        "quote" => {
            let stock = lookup(&machine, rest.first())?;
            machine.refresh_quotes(&[stock.symbol.clone()]).await;
            match machine.quote(&stock.symbol) {
                Some(q) => println!(
                    "{} {:.2} {:+.2} ({:+.2}%)",
                    q.symbol, q.price, q.change, q.percent_change
                ),
                None => println!("{}: no quote available", stock.symbol),
            }
        }
        "buy" => {
            let stock = lookup(&machine, rest.first())?;
            let quantity = parse_quantity(arg(rest, 1, "QTY")?)? as i64;
            let price = match rest.get(2) {
                Some(raw) => Some(
                    raw.parse::<f64>()
                        .map_err(|_| format!("invalid price '{}'", raw))?,
                ),
                None => None,
            };
            let after = machine
                .execute(TradeAction::Buy {
                    stock_id: stock.id,
                    quantity,
                    price,
                })
                .await?;
            report(&stock, &after);
        }
        "sell" => {
            let stock = lookup(&machine, rest.first())?;
            let quantity = parse_quantity(arg(rest, 1, "QTY")?)? as i64;
            let after = machine
                .execute(TradeAction::Sell {
                    stock_id: stock.id,
                    quantity,
                })
                .await?;
            report(&stock, &after);
        }
        "watch" | "note" => {
            let stock = lookup(&machine, rest.first())?;
            let note = (rest.len() > 1).then(|| rest[1..].join(" "));
            let action = if command == "watch" {
                TradeAction::Watch {
                    stock_id: stock.id,
                    note,
                }
            } else {
                TradeAction::Annotate {
                    stock_id: stock.id,
                    note,
                }
            };
            let after = machine.execute(action).await?;
            report(&stock, &after);
        }
        "unwatch" => {
            let stock = lookup(&machine, rest.first())?;
            let after = machine
                .execute(TradeAction::Unwatch { stock_id: stock.id })
                .await?;
            report(&stock, &after);
        }
        "history" => {
            let records = machine.trade_history().await?;
            for r in &records {
                println!(
                    "{}  {:<4} {:<6} {:>6} @ {:>10.2}  {:>12.2}",
                    r.traded_at.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", r.side).to_uppercase(),
                    r.symbol,
                    r.quantity,
                    r.price_per_share,
                    r.total_amount
                );
            }
            let totals = TradeHistorySummary::from_records(&records);
            println!(
                "bought {:.2}  sold {:.2}  net {:+.2}",
                totals.total_bought, totals.total_sold, totals.net
            );
        }
        "summary" => {
            machine.refresh_tracked_quotes().await;
            let summary = machine.summary().await;
            println!(
                "{} positions, value {:.2}, cost {:.2}, unrealized {:+.2}",
                summary.total_positions,
                summary.total_value,
                summary.total_cost,
                summary.unrealized_pnl
            );
            if !summary.unpriced.is_empty() {
                println!("no quote for: {}", summary.unpriced.join(", "));
            }
        }
        other => return Err(format!("unknown command '{}'\n\n{}", other, USAGE).into()),
    }
    Ok(())
}

fn arg<'a>(rest: &'a [String], index: usize, name: &str) -> Result<&'a str, String> {
    rest.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("missing {}", name))
}

fn lookup(machine: &TradingStateMachine, symbol: Option<&String>) -> Result<Stock, TradingError> {
    let symbol = symbol.map(String::as_str).unwrap_or_default();
    machine
        .stock_by_symbol(symbol)
        .ok_or_else(|| TradingError::StockNotFound(symbol.to_uppercase()))
}

fn report(stock: &Stock, snapshot: &Snapshot) {
    match snapshot.position(stock.id) {
        Some(p) => println!(
            "{}: {} shares @ {:.2} average",
            stock.symbol, p.quantity, p.average_price
        ),
        None => println!("{}: {}", stock.symbol, snapshot.state_of(stock.id)),
    }
}

fn print_positions(machine: &TradingStateMachine, snapshot: &Snapshot) {
    for p in snapshot.positions() {
        let quote = machine.quote(&p.symbol);
        let value = position_value(p, quote.as_ref())
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:>6} @ {:>10.2}  value {:>12}",
            p.symbol, p.quantity, p.average_price, value
        );
    }
}

fn print_watchlist(machine: &TradingStateMachine, snapshot: &Snapshot) {
    for e in snapshot.watchlist() {
        let price = machine
            .quote(&e.symbol)
            .map(|q| format!("{:.2} ({:?})", q.price, q.direction))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<20} {}",
            e.symbol,
            price,
            e.note.as_deref().unwrap_or("")
        );
    }
}
