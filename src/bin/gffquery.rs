use std::path::PathBuf;
use std::{env, process};

use gff_base::{Feature, FeatureInterface, GFFBase};

use getopts::Options;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    env_logger::init();

    // Parse arguments.
    let config = Config::new();

    // Open the database.
    let database = GFFBase::open(&config.db_file).map_err(|x| x.to_string())?;
    let mut interface = FeatureInterface::new(&database).map_err(|x| x.to_string())?;
    interface.set_keep_order(config.keep_order);

    // Run the query.
    match &config.query {
        Query::Feature(id) => {
            let feature = interface.feature(id).map_err(|x| x.to_string())?;
            let feature = feature.ok_or(format!("No feature with id {}", id))?;
            print_features(&interface, &[feature]);
        }
        Query::Children(id) => {
            let features = interface.children(id, config.level, config.featuretype.as_deref())
                .map_err(|x| x.to_string())?;
            print_features(&interface, &features);
        }
        Query::Parents(id) => {
            let features = interface.parents(id, config.level, config.featuretype.as_deref())
                .map_err(|x| x.to_string())?;
            print_features(&interface, &features);
        }
        Query::Region(region) => {
            let features = interface.region(
                Some(region.seqid.as_str()), region.start, region.end,
                config.featuretype.as_deref(), config.completely_within,
            ).map_err(|x| x.to_string())?;
            print_features(&interface, &features);
        }
        Query::Types => {
            for featuretype in interface.featuretypes().map_err(|x| x.to_string())? {
                let count = interface.count_features_of_type(&featuretype).map_err(|x| x.to_string())?;
                println!("{}\t{}", featuretype, count);
            }
        }
        Query::Directives => {
            for directive in interface.directives().map_err(|x| x.to_string())? {
                println!("{}", directive);
            }
        }
    }

    Ok(())
}

fn print_features(interface: &FeatureInterface, features: &[Feature]) {
    for feature in features {
        println!("{}", interface.line(feature));
    }
}

//-----------------------------------------------------------------------------

// A genomic region: seqid with optional bounds.
struct Region {
    seqid: String,
    start: Option<u64>,
    end: Option<u64>,
}

impl Region {
    // Parses "chr:start-end" or "chr".
    fn parse(s: &str) -> Result<Region, String> {
        let (seqid, range) = match s.split_once(':') {
            Some((seqid, range)) => (seqid, Some(range)),
            None => (s, None),
        };
        let (start, end) = match range {
            Some(range) => {
                let (start, end) = range.split_once('-')
                    .ok_or(format!("Invalid region {} (expected seqid:start-end)", s))?;
                let start = start.parse::<u64>().map_err(|x| x.to_string())?;
                let end = end.parse::<u64>().map_err(|x| x.to_string())?;
                (Some(start), Some(end))
            }
            None => (None, None),
        };
        Ok(Region { seqid: String::from(seqid), start, end })
    }
}

enum Query {
    Feature(String),
    Children(String),
    Parents(String),
    Region(Region),
    Types,
    Directives,
}

struct Config {
    pub db_file: PathBuf,
    pub query: Query,
    pub level: Option<u32>,
    pub featuretype: Option<String>,
    pub completely_within: bool,
    pub keep_order: bool,
}

impl Config {
    pub fn new() -> Config {
        let args: Vec<String> = env::args().collect();
        let program = args[0].clone();

        let mut opts = Options::new();
        opts.optflag("h", "help", "print this help");
        opts.optopt("f", "feature", "print the feature with this id", "ID");
        opts.optopt("c", "children", "print the children of this feature", "ID");
        opts.optopt("p", "parents", "print the parents of this feature", "ID");
        opts.optopt("r", "region", "print the features in this region", "CHR:START-END");
        opts.optflag("", "types", "print the feature types and their counts");
        opts.optflag("", "directives", "print the directives of the original file");
        opts.optopt("l", "level", "restrict children/parents to this relation level", "N");
        opts.optopt("t", "type", "restrict the output to this feature type", "TYPE");
        opts.optflag("", "completely-within", "only report features completely within the region");
        opts.optflag("", "keep-order", "render attributes in their original per-feature order");
        let matches = match opts.parse(&args[1..]) {
            Ok(m) => m,
            Err(f) => {
                eprintln!("{}", f);
                process::exit(1);
            }
        };

        let header = format!("Usage: {} [options] annotations.db", program);
        if matches.opt_present("h") {
            eprint!("{}", opts.usage(&header));
            process::exit(0);
        }
        let db_file = if let Some(s) = matches.free.first() {
            PathBuf::from(s)
        } else {
            eprint!("{}", opts.usage(&header));
            process::exit(1);
        };

        let mut query: Option<Query> = None;
        if let Some(id) = matches.opt_str("feature") {
            query = Some(Query::Feature(id));
        }
        if let Some(id) = matches.opt_str("children") {
            query = Some(Query::Children(id));
        }
        if let Some(id) = matches.opt_str("parents") {
            query = Some(Query::Parents(id));
        }
        if let Some(s) = matches.opt_str("region") {
            match Region::parse(&s) {
                Ok(region) => query = Some(Query::Region(region)),
                Err(err) => {
                    eprintln!("{}", err);
                    process::exit(1);
                }
            }
        }
        if matches.opt_present("types") {
            query = Some(Query::Types);
        }
        if matches.opt_present("directives") {
            query = Some(Query::Directives);
        }
        let query = match query {
            Some(query) => query,
            None => {
                eprint!("{}", opts.usage(&header));
                process::exit(1);
            }
        };

        let level = matches.opt_str("level").map(|s| {
            s.parse::<u32>().unwrap_or_else(|_| {
                eprintln!("Invalid relation level: {}", s);
                process::exit(1);
            })
        });

        Config {
            db_file,
            query,
            level,
            featuretype: matches.opt_str("type"),
            completely_within: matches.opt_present("completely-within"),
            keep_order: matches.opt_present("keep-order"),
        }
    }
}

//-----------------------------------------------------------------------------
