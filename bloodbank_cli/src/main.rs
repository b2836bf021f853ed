use bloodbank_core::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bbms")]
#[command(about = "Blood bank inventory management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show inventory with stock warnings
    Inventory {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add units of a blood type and component
    Restock {
        blood_type: String,
        component: String,
        /// Units to add (must not be negative)
        #[arg(allow_negative_numbers = true)]
        units: i64,
        /// Expiration date (YYYY-MM-DD)
        expiration: String,
    },

    /// Earmark units for a known future need
    Reserve {
        blood_type: String,
        component: String,
        units: u32,
    },

    /// Return reserved units to available stock
    Release {
        blood_type: String,
        component: String,
        units: u32,
    },

    /// Block one record (requires the record to hold at least UNITS)
    Block {
        blood_type: String,
        component: String,
        units: u32,
    },

    /// Block every available record of a blood type
    BlockType { blood_type: String },

    /// Block the entire inventory
    BlockAll,

    /// Request blood for a recipient
    Request {
        recipient_id: String,
        blood_type: String,
        units: u32,
        /// Low, Medium or High
        #[arg(long, default_value = "Medium")]
        urgency: String,
    },

    /// Show a recipient's request history
    Requests { recipient_id: String },

    /// List donor types compatible with a recipient type (or UNKNOWN)
    Compat { blood_type: String },

    /// List pending blood typing tests
    Tests,

    /// Request a typing test for a donor or recipient with unknown blood type
    RequestTest {
        subject_id: String,
        /// Donor or Recipient
        role: String,
    },

    /// Record the blood type result of a typing test
    CompleteTest { test_id: String, blood_type: String },

    /// Show system counts
    Report,
}

fn main() -> Result<()> {
    bloodbank_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }
    std::fs::create_dir_all(&config.data.data_dir)?;
    tracing::debug!("Using data directory {:?}", config.data.data_dir);

    let result = run(cli.command, &config);
    if let Err(ref e) = result {
        if e.is_storage() {
            eprintln!("Storage failure; nothing was applied. Re-run once the data directory is writable.");
        }
    }
    result
}

fn run(command: Commands, config: &Config) -> Result<()> {
    let paths = config.paths();
    let today = chrono::Local::now().date_naive();

    match command {
        Commands::Inventory { json } => {
            let ledger = open_ledger(config)?;
            let snapshot = ledger.snapshot(today);
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                display_snapshot(&snapshot);
            }
            Ok(())
        }

        Commands::Restock {
            blood_type,
            component,
            units,
            expiration,
        } => {
            let blood_type: BloodType = blood_type.parse()?;
            let component: Component = component.parse()?;
            let expiration = parse_date(&expiration)?;
            let ledger = open_ledger(config)?;
            let record = ledger.restock_delta(blood_type, component, units, expiration)?;
            println!(
                "✓ Inventory updated: {} {}, {} units (expires {})",
                record.blood_type, record.component, record.units, record.expiration
            );
            Ok(())
        }

        Commands::Reserve {
            blood_type,
            component,
            units,
        } => {
            let (blood_type, component) = parse_key(&blood_type, &component)?;
            let outcome = open_ledger(config)?.reserve(blood_type, component, units)?;
            outcome.into_result("reserve")?;
            println!("✓ Reserved {} units of {} {}", units, blood_type, component);
            Ok(())
        }

        Commands::Release {
            blood_type,
            component,
            units,
        } => {
            let (blood_type, component) = parse_key(&blood_type, &component)?;
            let outcome = open_ledger(config)?.release(blood_type, component, units)?;
            outcome.into_result("release")?;
            println!("✓ Released {} units of {} {}", units, blood_type, component);
            Ok(())
        }

        Commands::Block {
            blood_type,
            component,
            units,
        } => {
            let (blood_type, component) = parse_key(&blood_type, &component)?;
            let outcome = open_ledger(config)?.block(blood_type, component, units)?;
            outcome.into_result("block")?;
            println!("✓ Blocked {} {}", blood_type, component);
            Ok(())
        }

        Commands::BlockType { blood_type } => {
            let blood_type: BloodType = blood_type.parse()?;
            let outcome = open_ledger(config)?.block_type(blood_type)?;
            outcome.into_result("block-type")?;
            println!("✓ Blocked all {} stock", blood_type);
            Ok(())
        }

        Commands::BlockAll => {
            open_ledger(config)?.block_all()?;
            println!("✓ Entire stock blocked");
            Ok(())
        }

        Commands::Request {
            recipient_id,
            blood_type,
            units,
            urgency,
        } => {
            let blood_type: BloodType = blood_type.parse()?;
            let urgency: Urgency = urgency.parse()?;
            let ledger = open_ledger(config)?;
            let requests = RequestLog::new(&paths.requests);
            let profiles = profile_store(&paths);
            let engine = FulfillmentEngine::new(&ledger, &requests, &profiles)
                .with_donation_interval(config.donors.donation_interval_days);

            let report = engine.fulfill(&recipient_id, blood_type, units, urgency, today)?;
            display_fulfillment(&report);
            Ok(())
        }

        Commands::Requests { recipient_id } => {
            let requests = RequestLog::new(&paths.requests).for_recipient(&recipient_id)?;
            if requests.is_empty() {
                println!("No blood requests found.");
                return Ok(());
            }
            println!("Request ID                           | Type | Units | Urgency | Status");
            println!("-------------------------------------+------+-------+---------+----------");
            for r in requests {
                println!(
                    "{:<37}| {:<5}| {:>6}| {:<8}| {:?}",
                    r.id, r.blood_type, r.units, r.urgency, r.status
                );
            }
            Ok(())
        }

        Commands::Compat { blood_type } => {
            let recipient = BloodType::parse_group(&blood_type)?;
            let donors: Vec<&str> = compatible_donor_types_for(recipient)
                .iter()
                .map(BloodType::as_str)
                .collect();
            match recipient {
                Some(t) => println!("{} can receive from: {}", t, donors.join(", ")),
                None => println!("{} can receive from: none until blood typing is completed", UNKNOWN_BLOOD_TYPE),
            }
            Ok(())
        }

        Commands::Tests => {
            let profiles = profile_store(&paths);
            let tests = TypingWorkflow::new(&paths.tests, &profiles).pending_tests()?;
            if tests.is_empty() {
                println!("No pending test requests.");
                return Ok(());
            }
            println!("Test ID                              | Subject  | Role      | Requested");
            println!("-------------------------------------+----------+-----------+-----------");
            for t in tests {
                println!(
                    "{:<37}| {:<9}| {:<10}| {}",
                    t.id, t.subject_id, t.role, t.requested_on
                );
            }
            Ok(())
        }

        Commands::RequestTest { subject_id, role } => {
            let role: Role = role.parse()?;
            let profiles = profile_store(&paths);
            let test = TypingWorkflow::new(&paths.tests, &profiles).request_test(&subject_id, role, today)?;
            println!("✓ Blood type test requested for {} {}", role, subject_id);
            println!("  Test ID: {}", test.id);
            Ok(())
        }

        Commands::CompleteTest {
            test_id,
            blood_type,
        } => {
            let test_id = uuid::Uuid::parse_str(test_id.trim())
                .map_err(|e| Error::Validation(format!("Invalid test id {:?}: {}", test_id, e)))?;
            let blood_type: BloodType = blood_type.parse()?;
            let profiles = profile_store(&paths);
            let test = TypingWorkflow::new(&paths.tests, &profiles).complete_test(test_id, blood_type)?;
            println!(
                "✓ Test {} completed: {} {} is {}",
                test.id, test.role, test.subject_id, blood_type
            );
            Ok(())
        }

        Commands::Report => {
            let profiles = profile_store(&paths);
            let pending = TypingWorkflow::new(&paths.tests, &profiles).pending_tests()?.len();
            let requests = RequestLog::new(&paths.requests).all()?;
            let fulfilled = requests
                .iter()
                .filter(|r| r.status == RequestStatus::Fulfilled)
                .count();

            println!("Registered donors:     {}", profiles.donors()?.len());
            println!("Registered recipients: {}", profiles.recipients()?.len());
            println!("Pending typing tests:  {}", pending);
            println!("Blood requests:        {} ({} fulfilled)", requests.len(), fulfilled);
            Ok(())
        }
    }
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    Ledger::open_with(config.paths().inventory, config.inventory.clone())
}

fn profile_store(paths: &DataPaths) -> CsvProfileStore {
    CsvProfileStore::new(&paths.donors, &paths.recipients)
}

fn parse_key(blood_type: &str, component: &str) -> Result<(BloodType, Component)> {
    Ok((blood_type.parse()?, component.parse()?))
}

fn display_snapshot(snapshot: &Snapshot) {
    if snapshot.is_empty() {
        println!("Inventory is currently empty.");
        return;
    }

    println!("Type | Component  | Units | Expiration | Reserved | Status");
    println!("-----+------------+-------+------------+----------+----------");
    for entry in &snapshot.entries {
        let r = &entry.record;
        println!(
            "{:<5}| {:<11}| {:>6}| {:<11}| {:>9}| {:?}",
            r.blood_type,
            r.component,
            r.units,
            r.expiration,
            r.reserved,
            r.status
        );
        for warning in &entry.warnings {
            println!("  {}", warning);
        }
    }
}

fn display_fulfillment(report: &FulfillmentReport) {
    println!("Request ID: {}", report.request.id);
    match &report.outcome {
        FulfillmentOutcome::Fulfilled { component } => {
            println!("✓ Blood request fulfilled from inventory ({})", component);
        }
        FulfillmentOutcome::Blocked { reason } => match reason {
            BlockReason::BloodTypeBlocked => {
                println!("✗ Blood type {} is currently blocked by admin.", report.request.blood_type)
            }
            BlockReason::EntireStockBlocked => {
                println!("✗ Entire blood stock is blocked by admin.")
            }
        },
        FulfillmentOutcome::Pending { contacts } if contacts.is_empty() => {
            println!(
                "No compatible donors found for blood type {}.",
                report.request.blood_type
            );
        }
        FulfillmentOutcome::Pending { contacts } => {
            println!("Blood not available in inventory. Contact the following compatible donors:");
            println!("Name                 | Contact              | Type | Eligible");
            for c in contacts {
                println!(
                    "{:<21}| {:<21}| {:<5}| {}",
                    c.name,
                    c.contact,
                    c.blood_type,
                    if c.eligible { "yes" } else { "no" }
                );
            }
        }
    }
}
