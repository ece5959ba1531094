use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use acs_atlas::chart::{bar_chart, trend_chart};
use acs_atlas::color::{hex, legend_title};
use acs_atlas::data::loader::{load_table_parameters, read_manifest};
use acs_atlas::{
    AtlasConfig, Catalog, ChoroplethScale, DatasetKey, Facet, FilterConstraints, FsFetcher,
};

#[derive(Parser)]
#[command(name = "acs-atlas", about = "Browse census tables and classify them for choropleth maps")]
struct Cli {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Table parameter feed.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Manifest listing data and boundary files.
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Directory manifest paths are relative to.
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// Number of choropleth classes.
    #[arg(long)]
    classes: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the values available for each filter.
    Facets,
    /// List drawable datasets, optionally filtered ("ALL" matches anything).
    List {
        #[arg(long, default_value = "ALL")]
        year: String,
        #[arg(long, default_value = "ALL")]
        region: String,
        #[arg(long, default_value = "ALL")]
        geography: String,
        #[arg(long, default_value = "ALL")]
        survey: String,
        #[arg(long, default_value = "ALL")]
        table: String,
    },
    /// Classify a dataset and print the colour of every region.
    Map { key: String },
    /// Bar chart series for one region.
    Bar { key: String, geoid: String },
    /// Trend of one group across years for one region.
    Trend {
        key: String,
        geoid: String,
        #[arg(long, default_value_t = 0)]
        group: usize,
        #[arg(long)]
        from: Option<u16>,
        #[arg(long)]
        to: Option<u16>,
    },
}

fn load_config(cli: &Cli) -> Result<AtlasConfig> {
    let mut config = match &cli.config {
        Some(path) => AtlasConfig::from_file(path)?,
        None => AtlasConfig::default(),
    };
    if let Some(path) = &cli.params {
        config.table_params_file = path.clone();
    }
    if let Some(path) = &cli.manifest {
        config.manifest_file = path.clone();
    }
    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    if let Some(classes) = cli.classes {
        config.classes = classes;
    }
    config.validate()?;
    Ok(config)
}

fn build_catalog(config: &AtlasConfig) -> Result<Catalog> {
    let params = load_table_parameters(&config.table_params_file)
        .context("loading table parameters")?;
    let manifest = read_manifest(&config.manifest_file).context("reading manifest")?;
    let fetcher = Arc::new(FsFetcher::new(&config.data_root));
    Ok(Catalog::from_manifest(params, &manifest, fetcher, config.classes))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli).context("loading configuration")?;
    let catalog = build_catalog(&config)?;

    match &cli.command {
        Command::Facets => {
            for facet in Facet::ALL {
                println!("{}: {}", facet.label(), catalog.facet_values(facet).join(", "));
            }
        }
        Command::List {
            year,
            region,
            geography,
            survey,
            table,
        } => {
            let constraints = FilterConstraints::all()
                .with(Facet::Year, year)?
                .with(Facet::Region, region)?
                .with(Facet::Geography, geography)?
                .with(Facet::Survey, survey)?
                .with(Facet::TableId, table)?;
            for record in catalog.filtered(&constraints) {
                let key = &record.key;
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    key.region.to_ascii_uppercase(),
                    key.geography,
                    key.survey,
                    key.year,
                    key.table_id,
                    record.display_title()
                );
            }
        }
        Command::Map { key } => {
            let key: DatasetKey = key.parse()?;
            let activation = catalog.activate(&key, true).await?;
            let params = activation.dataset.table_params.as_deref();
            let Some(scale) = ChoroplethScale::for_table(&activation.table) else {
                bail!("{key}: no classification available ({})", activation.dataset.display_title());
            };
            println!("{} ({:?})", legend_title(params), scale.breaks().method());
            for entry in scale.legend_entries() {
                println!("  {}  {}", hex(entry.color), entry.label);
            }
            if let (Some(params), Some(layer)) = (params, &activation.layer) {
                for (geoid, color) in scale.region_colors(params, &activation.table, &layer.features) {
                    println!("{geoid}\t{}", hex(color));
                }
            }
        }
        Command::Bar { key, geoid } => {
            let key: DatasetKey = key.parse()?;
            let activation = catalog.activate(&key, false).await?;
            let params = activation
                .dataset
                .table_params
                .as_deref()
                .with_context(|| format!("no table parameters for {}", key.table_id))?;
            let chart = bar_chart(params, &activation.table, key.year, geoid)?;
            println!("{}", chart.title);
            for series in chart.series {
                println!("[{}]", series.name);
                for (label, value) in series.bars {
                    println!("  {label}: {}", value.map_or("-".to_string(), |v| v.to_string()));
                }
            }
        }
        Command::Trend {
            key,
            geoid,
            group,
            from,
            to,
        } => {
            let key: DatasetKey = key.parse()?;
            let record = catalog
                .lookup_dataset(&key)
                .with_context(|| format!("no dataset {key}"))?;
            let params = record
                .table_params
                .as_deref()
                .with_context(|| format!("no table parameters for {}", key.table_id))?;
            let years = from.unwrap_or(config.min_year)..=to.unwrap_or(config.max_year);
            let series = catalog.load_time_series(&key, years).await;
            let chart = trend_chart(params, &series, geoid, *group)?;
            println!("{} [{}]", chart.title, chart.y_label);
            for line in chart.series {
                let points: Vec<String> =
                    line.points.iter().map(|(year, v)| format!("{year}={v}")).collect();
                println!("  {}: {}", line.name, points.join(" "));
            }
        }
    }
    Ok(())
}
