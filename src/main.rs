use playlist_mirror::{
    args::get_env_args,
    config::MirrorConfig,
    logging::init_tracing,
    sync::{sync_all, SyncContext},
    Result,
};

fn main() -> Result<()> {
    init_tracing();
    let args = get_env_args();

    if args.new {
        println!("{}", MirrorConfig::default());
        return Ok(());
    }

    let config = MirrorConfig::parse_config(&args.config_path)?;

    if args.print {
        println!("{config}");
        return Ok(());
    }

    let selected = match config.selected_targets(&args.targets) {
        Ok(selected) => selected,
        Err(e) => {
            println!("{e}");
            return Ok(());
        }
    };

    let mut targets = Vec::with_capacity(selected.len());
    for target in selected {
        match config.resolve(target) {
            Ok(resolved) => targets.push(resolved),
            Err(e) => println!("{}: {e:#}", target.name()),
        }
    }

    let ctx = SyncContext {
        data_dir: config.data_dir()?,
        dry_run: args.dry_run,
        force: args.force,
    };

    let mut failed = false;
    for (name, result) in sync_all(&targets, &ctx) {
        match result {
            Ok(report) => {
                println!("{report}");
                failed |= !report.failures.is_empty();
            }
            Err(e) => println!("{name}: {e:#}"),
        }
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}
