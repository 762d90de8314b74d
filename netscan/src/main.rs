use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use netscan_core::events::{EventBus, StreamItem};
use report_store::ReportStore;
use scan_engine::{ActivePolicy, ScanCoordinator, ScanRequest};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

mod config;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "netscan", version, about = "TCP exposure scanner and attack-surface mapper")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./netscan.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory where reports are persisted.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Sweep a port range and run the risk/chain/graph pipeline
    Scan {
        /// Target host or IP
        target: String,
        /// First port of the range
        #[arg(long, default_value_t = 1)]
        start: u16,
        /// Last port of the range
        #[arg(long, default_value_t = 1024)]
        end: u16,
        /// Concurrent scan workers
        #[arg(long, default_value_t = 100)]
        workers: usize,
        /// Print scan events as JSON lines while the scan runs
        #[arg(long, default_value_t = false)]
        stream: bool,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write open ports as CSV when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Print a persisted report (latest by default)
    Report {
        /// Target whose saved report to load instead of the latest
        #[arg(long)]
        target: Option<String>,
    },
    /// Run the analysis pipeline over a saved report file
    Analyze {
        /// Report JSON file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Version => {
            println!("netscan {} (core {})", env!("CARGO_PKG_VERSION"), netscan_core::version());
        }
        Commands::Scan { target, mut start, mut end, mut workers, stream, mut format, out, csv } => {
            if let Some(cfg) = &loaded_cfg { if let Some(s) = &cfg.scan {
                if s.start.is_some() { start = s.start.unwrap(); }
                if s.end.is_some() { end = s.end.unwrap(); }
                if s.workers.is_some() { workers = s.workers.unwrap(); }
                if let Some(f) = &s.format { format = match f.as_str() { "json" => OutputFormat::Json, "jsonl" => OutputFormat::Jsonl, _ => OutputFormat::Text }; }
            }}

            let bus = Arc::new(EventBus::new());
            let store = Arc::new(ReportStore::new(&cli.data_dir));
            let coordinator =
                Arc::new(ScanCoordinator::new(Arc::clone(&bus), store, ActivePolicy::Supersede));

            let mut request = ScanRequest::new(target);
            request.start_port = start;
            request.end_port = end;
            request.workers = workers;

            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(async move {
                let printer = if stream {
                    let mut rx = bus
                        .subscribe(&request.target)
                        .ok_or_else(|| anyhow!("event stream already claimed"))?;
                    Some(tokio::spawn(async move {
                        while let Some(item) = rx.recv().await {
                            match item {
                                StreamItem::Event(event) => {
                                    if let Ok(line) = serde_json::to_string(&event) {
                                        println!("{line}");
                                    }
                                }
                                StreamItem::End => break,
                            }
                        }
                    }))
                } else {
                    None
                };
                let report = coordinator.run(request).await?;
                if let Some(printer) = printer {
                    let _ = printer.await;
                }
                Ok::<_, anyhow::Error>(report)
            })?;

            let risk = risk_analysis::analyze(&report);
            let chains = risk_analysis::build_chains(&risk.analysis);
            let graph = attack_graph::build_graph(&risk.analysis, &chains.chains);
            let exposure = attack_graph::network_exposure(&graph);

            if csv {
                if let Some(path) = out {
                    let mut wtr = csv::Writer::from_writer(std::fs::File::create(&path)?);
                    wtr.write_record(["target", "port", "service", "vulnerabilities"])?;
                    for (port, record) in &report.open_ports {
                        let port = port.to_string();
                        let vulnerabilities = record.vulnerabilities.join("|");
                        wtr.write_record([
                            report.target.as_str(),
                            port.as_str(),
                            record.service.as_str(),
                            vulnerabilities.as_str(),
                        ])?;
                    }
                    wtr.flush()?;
                    return Ok(());
                } else {
                    println!("--csv requires --out <file>");
                }
            }

            let line = match format {
                OutputFormat::Text => {
                    let summary = &report.scan_summary;
                    let mut text = format!(
                        "{}: {} open / {} closed / {} filtered ({} scanned)\n",
                        report.target,
                        summary.open_ports,
                        summary.closed_ports,
                        summary.filtered_ports,
                        summary.total_ports_scanned,
                    );
                    for (port, record) in &report.open_ports {
                        text.push_str(&format!("  {:>5}  {}\n", port, record.service));
                    }
                    text.push_str(&format!(
                        "exposure {} ({}), {} attack chains",
                        exposure.exposure_score,
                        exposure.severity,
                        chains.total_chains,
                    ));
                    text
                }
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let obj = serde_json::json!({
                        "report": report,
                        "analysis": risk,
                        "attack_chains": chains,
                        "graph": graph,
                        "exposure": exposure,
                    });
                    if format == OutputFormat::Json {
                        serde_json::to_string_pretty(&obj)?
                    } else {
                        serde_json::to_string(&obj)?
                    }
                }
            };
            if let Some(path) = out {
                let file = OpenOptions::new().create(true).truncate(true).write(true).open(&path)?;
                let mut w = BufWriter::new(file);
                writeln!(w, "{}", line)?;
            } else {
                println!("{}", line);
            }
        }
        Commands::Report { target } => {
            let store = ReportStore::new(&cli.data_dir);
            let value = match target {
                Some(t) => store.load_target(&t)?,
                None => store.load_latest()?,
            };
            match value {
                Some(v) => println!("{}", serde_json::to_string_pretty(&v)?),
                None => return Err(anyhow!("no saved report found")),
            }
        }
        Commands::Analyze { file } => {
            let text = std::fs::read_to_string(&file)?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let value = report_store::normalize_report(value);
            let analysis = risk_analysis::analyze_value(&value);
            let chains = risk_analysis::build_chains(&analysis.analysis);
            let graph = attack_graph::build_graph(&analysis.analysis, &chains.chains);
            let exposure = attack_graph::network_exposure(&graph);
            let obj = serde_json::json!({
                "analysis": analysis,
                "attack_chains": chains,
                "graph": graph,
                "exposure": exposure,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }
    Ok(())
}
