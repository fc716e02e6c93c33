use std::path::PathBuf;
use std::time::Instant;
use std::{env, process};

use gff_base::{GFFBase, IdSpec, IngestParams, Input, MergeStrategy};
use gff_base::utils;

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();

    // Parse arguments.
    let config = Config::new();

    // Create the database.
    let input = Input::guess(&config.input).map_err(|x| x.to_string())?;
    let params = config.params;
    GFFBase::create(input, &config.db_file, params).map_err(|x| x.to_string())?;

    // Statistics.
    let database = GFFBase::open(&config.db_file).map_err(|x| x.to_string())?;
    eprintln!("The database contains {} features and {} relations",
        database.features(), database.relations()
    );
    eprintln!("Attribute dialect: {}", database.dialect().fmt);
    let size = database.file_size().unwrap_or(String::from("unknown"));
    eprintln!("Final database size: {}", size);

    let end_time = Instant::now();
    let seconds = end_time.duration_since(start_time).as_secs_f64();
    eprintln!("Used {:.3} seconds", seconds);

    Ok(())
}

//-----------------------------------------------------------------------------

struct Config {
    pub input: String,
    pub db_file: PathBuf,
    pub params: IngestParams,
}

impl Config {
    pub fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("o", "output", "output file name (default: <input>.db)", "FILE");
        opts.optflag("", "force", "overwrite the database file if it exists");
        opts.optflag("v", "verbose", "report progress during the ingest");
        opts.optopt("", "id-spec", "comma-separated attribute keys for primary keys; :field: refers to a standard column", "KEYS");
        opts.optopt("", "merge-strategy", "one of error, warning, merge, create_unique, replace (default: error)", "STRAT");
        opts.optopt("", "checklines", "number of features to check for the dialect (default: 10)", "N");
        opts.optflag("", "force-dialect-check", "re-infer the dialect for every line");
        opts.optflag("", "force-gff", "treat the input as GFF3 even if it looks like GTF");
        opts.optopt("", "transcript-key", "GTF attribute grouping components into transcripts (default: transcript_id)", "KEY");
        opts.optopt("", "gene-key", "GTF attribute grouping transcripts into genes (default: gene_id)", "KEY");
        opts.optopt("", "subfeature", "GTF feature type that drives inference (default: exon)", "TYPE");
        opts.optflag("", "disable-infer-genes", "do not synthesize gene features for GTF input");
        opts.optflag("", "disable-infer-transcripts", "do not synthesize transcript features for GTF input");
        opts.optflag("", "ignore-url-escapes", "do not decode or encode %XX escapes in attribute values");
        let matches = match opts.parse(&args[1..]) {
            Ok(m) => m,
            Err(f) => {
                eprintln!("{}", f);
                process::exit(1);
            }
        };

        let header = format!("Usage: {} [options] annotations.gff3", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }
        let input = if let Some(s) = matches.free.first() {
            s.clone()
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };
        let db_file = match matches.opt_str("o") {
            Some(s) => PathBuf::from(s),
            None => PathBuf::from(format!("{}.db", input)),
        };

        let mut params = IngestParams {
            force: matches.opt_present("force"),
            verbose: matches.opt_present("verbose"),
            force_dialect_check: matches.opt_present("force-dialect-check"),
            force_gff: matches.opt_present("force-gff"),
            disable_infer_genes: matches.opt_present("disable-infer-genes"),
            disable_infer_transcripts: matches.opt_present("disable-infer-transcripts"),
            ignore_url_escapes: matches.opt_present("ignore-url-escapes"),
            ..IngestParams::default()
        };
        if let Some(s) = matches.opt_str("id-spec") {
            let keys: Vec<String> = s.split(',').map(String::from).collect();
            params.id_spec = Some(if keys.len() == 1 {
                IdSpec::Key(keys.into_iter().next().unwrap())
            } else {
                IdSpec::Keys(keys)
            });
        }
        if let Some(s) = matches.opt_str("merge-strategy") {
            match s.parse::<MergeStrategy>() {
                Ok(strategy) => params.merge_strategy = strategy,
                Err(err) => {
                    eprintln!("{}", err);
                    process::exit(1);
                }
            }
        }
        if let Some(s) = matches.opt_str("checklines") {
            match s.parse::<usize>() {
                Ok(n) => params.checklines = n,
                Err(_) => {
                    eprintln!("Invalid number of lines to check: {}", s);
                    process::exit(1);
                }
            }
        }
        if let Some(s) = matches.opt_str("transcript-key") {
            params.gtf_transcript_key = s;
        }
        if let Some(s) = matches.opt_str("gene-key") {
            params.gtf_gene_key = s;
        }
        if let Some(s) = matches.opt_str("subfeature") {
            params.gtf_subfeature = s;
        }

        // An existing database is only overwritten with --force; GFFBase
        // handles the check.
        if utils::file_exists(&db_file) && !params.force {
            eprintln!("Database {} already exists (use --force to overwrite)", db_file.display());
            process::exit(1);
        }

        Config { input, db_file, params }
    }
}

//-----------------------------------------------------------------------------
