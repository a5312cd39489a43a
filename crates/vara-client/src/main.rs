use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use vara_client::billing::Billing;
use vara_client::core::{AppCore, CoreEvent};
use vara_client::downloads::DownloadRunner;
use vara_client::media::{MediaSink, MpvSink, NullSink};
use vara_client::shell::{self, AccountAction};
use vara_client::BroadcastMessage;
use vara_proto::config::Config;
use vara_proto::model::{Order, PaymentConfirmation};
use vara_proto::platform;
use vara_proto::state::StateManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("vara.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise debug for our code with the HTTP stack quieted.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("vara log: {}", log_path.display());
    tracing::info!("vara starting");

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("config unreadable, using defaults: {}", e);
            Config::default()
        }
    };
    tracing::info!("config: {:?}", Config::config_path());

    let volume = StateManager::load_persistent(&config.paths.state_file)
        .map(|p| p.volume)
        .unwrap_or(config.player.default_volume);

    let (sink, media_rx) = if config.player.use_mpv && platform::find_mpv_binary().is_some() {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let sink: Box<dyn MediaSink> = Box::new(MpvSink::spawn(volume, media_tx));
        (sink, Some(media_rx))
    } else {
        tracing::warn!("mpv disabled or not found, audio output is off");
        eprintln!("mpv not available: running without audio");
        let sink: Box<dyn MediaSink> = Box::new(NullSink);
        (sink, None)
    };

    let (broadcast_tx, mut broadcast_rx) = broadcast::channel::<BroadcastMessage>(1024);
    let (event_tx, event_rx) = mpsc::channel::<CoreEvent>(1024);

    let location = std::env::args().nth(1).unwrap_or_else(|| "/home".to_string());
    let core = AppCore::new(config, sink, media_rx, event_tx.clone(), broadcast_tx)?
        .with_location(&location);
    let billing = core.billing();
    let licences = core.downloads();

    let core_handle = tokio::spawn(async move {
        if let Err(e) = core.run(event_rx).await {
            tracing::error!("AppCore exited with error: {}", e);
        }
    });

    tokio::spawn(async move {
        let mut last_line = String::new();
        loop {
            match broadcast_rx.recv().await {
                Ok(BroadcastMessage::StateUpdated(snap)) => {
                    // sub-second time updates bump rev without changing the printed line
                    let line = shell::summary(&snap);
                    let body = line.split_once(' ').map(|(_, b)| b).unwrap_or(line.as_str());
                    let last_body = last_line.split_once(' ').map(|(_, b)| b).unwrap_or(last_line.as_str());
                    if body != last_body {
                        println!("{}", line);
                        last_line = line;
                    }
                }
                Ok(BroadcastMessage::Notification(n)) => println!("{}", shell::notification_line(&n)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("shell: skipped {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("{}", shell::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_order: Option<Order> = None;
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "quit" | "exit" => break,
            "help" | "?" => {
                println!("{}", shell::HELP);
                continue;
            }
            _ => {}
        }
        if let Some(action) = shell::parse_account(&line) {
            match action {
                Ok(action) => {
                    run_account(action, &billing, &licences, &mut pending_order, &event_tx).await
                }
                Err(msg) => eprintln!("{}", msg),
            }
            continue;
        }
        match shell::parse_line(&line) {
            Ok(Some(cmd)) => {
                if event_tx.send(CoreEvent::Command(cmd)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(msg) => eprintln!("{}", msg),
        }
    }

    let _ = event_tx.send(CoreEvent::Shutdown).await;
    let _ = core_handle.await;
    tracing::info!("vara stopped");
    Ok(())
}

async fn run_account(
    action: AccountAction,
    billing: &Billing,
    licences: &DownloadRunner,
    pending_order: &mut Option<Order>,
    event_tx: &mpsc::Sender<CoreEvent>,
) {
    match action {
        AccountAction::Plans => match billing.plans().await {
            Ok(plans) => plans.iter().for_each(|p| println!("{}", shell::plan_line(p))),
            Err(e) => eprintln!("cannot load plans: {}", e),
        },
        AccountAction::Order(plan) => match billing.create_order(&plan).await {
            Ok(order) if order.simulated => {
                println!("order {} needs no payment, use: buy {}", order.order_id, plan);
            }
            Ok(order) => {
                println!(
                    "order {}: pay {} with gateway key {}, then: pay <payment id> <signature>",
                    order.order_id,
                    shell::money(order.amount, &order.currency),
                    order.key_id.as_deref().unwrap_or("-"),
                );
                *pending_order = Some(order);
            }
            Err(e) => eprintln!("cannot create order: {}", e),
        },
        AccountAction::Pay {
            payment_id,
            signature,
        } => {
            let Some(order) = pending_order.as_ref() else {
                eprintln!("no open order, start one with: order <plan id>");
                return;
            };
            let payment = PaymentConfirmation {
                order_id: order.order_id.clone(),
                payment_id,
                signature,
            };
            match billing.confirm(order, &payment).await {
                Ok(()) => {
                    *pending_order = None;
                    let _ = event_tx.send(CoreEvent::PurchaseCompleted).await;
                }
                Err(e) => eprintln!("payment not confirmed: {}", e),
            }
        }
        // dev backends only: the real gateway is driven by a browser
        AccountAction::Buy(plan) => match billing.simulate(&plan).await {
            Ok(()) => {
                let _ = event_tx.send(CoreEvent::PurchaseCompleted).await;
            }
            Err(e) => eprintln!("purchase failed: {}", e),
        },
        AccountAction::Licences => match licences.license_history().await {
            Ok(list) if list.is_empty() => println!("no licences yet"),
            Ok(list) => list.iter().for_each(|l| println!("{}", shell::license_line(l))),
            Err(e) => eprintln!("cannot load licences: {}", e),
        },
    }
}
