fn main() {
    if let Err(err) = native::run() {
        eprintln!("vascu_cli error: {err}");
        std::process::exit(1);
    }
}

mod native {
    use std::fs;
    use std::path::{Path, PathBuf};

    use log::{LevelFilter, Log, Metadata, Record};
    use vascu_engine::branch::{CurveOptions, CurvedTree, StraightFactory};
    use vascu_engine::config::{ProfileKind, VascularConfig};
    use vascu_engine::geom::read_obj;
    use vascu_engine::graph::VesselGraph;
    use vascu_engine::graph::orient::orient_edges;
    use vascu_engine::model::{ModelOptions, TreeModel};
    use vascu_engine::perfusion::{MapParams, PerfusionMap};
    use vascu_engine::vasculature::{GenericProfile, OrganProfile, VasculatureGenerator};

    const USAGE: &str = r#"vascu_cli (vascu-engine)

USAGE:
  vascu_cli maps <organ.obj> --out-dir <dir> [--grid-width <n>]
  vascu_cli model <tree.gxl|tree.graphml> [--obj <path>] [--sides <n>] [--curved] [--graphml <path>]
  vascu_cli generate <organ.obj> --config <scene.xml> --out-dir <dir> [--work-dir <dir>] [--seed <n>]

OPTIONS:
  --out-dir <dir>     Output directory
  --grid-width <n>    Voxels along x (maps, default 100)
  --obj <path>        Mesh output (model, default next to the input)
  --sides <n>         Sides per tube cross-section (model, default 16)
  --curved            Sweep sine-generated curves instead of straight tubes (model)
  --graphml <path>    Also write the oriented tree as GraphML (model)
  --config <path>     Scene XML (generate)
  --work-dir <dir>    Directory for the growth tool (generate, default <out-dir>/work)
  --seed <n>          Override the scene seed (generate)
  -v, --verbose       Debug logging
  -q, --quiet         Errors only
  -h, --help          Show this help
"#;

    struct StderrLogger;

    impl Log for StderrLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    fn init_logger(level: LevelFilter) {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }

    pub fn run() -> Result<(), String> {
        let mut level = LevelFilter::Info;
        let args: Vec<String> = std::env::args()
            .skip(1)
            .filter(|arg| match arg.as_str() {
                "-v" | "--verbose" => {
                    level = LevelFilter::Debug;
                    false
                }
                "-q" | "--quiet" => {
                    level = LevelFilter::Error;
                    false
                }
                _ => true,
            })
            .collect();
        init_logger(level);
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "maps" => cmd_maps(&mut args),
            "model" => cmd_model(&mut args),
            "generate" => cmd_generate(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn cmd_maps(args: &mut Args) -> Result<(), String> {
        let organ_path = PathBuf::from(args.next().ok_or("missing organ mesh")?);
        let mut out_dir: Option<PathBuf> = None;
        let mut params = MapParams::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--grid-width" => params.grid_width = args.number("--grid-width")?,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }
        let out_dir = out_dir.ok_or("maps requires --out-dir")?;

        let organ = read_obj(&organ_path).map_err(|e| format!("read {}: {e}", organ_path.display()))?;
        let map = PerfusionMap::compute(&organ, &params).map_err(|e| e.to_string())?;
        fs::create_dir_all(&out_dir).map_err(|e| format!("create out dir: {e}"))?;
        let maps = map.maps();
        write_text_file(&out_dir.join("demand_map.txt"), &maps.demand_map)?;
        write_text_file(&out_dir.join("supply_map.txt"), &maps.supply_map)?;

        let frame = map.frame();
        eprintln!(
            "grid {:?} pitch={:.6} occupied={} volume={:.6}",
            frame.dims,
            frame.pitch,
            map.occupancy().count(),
            map.occupied_volume()
        );
        Ok(())
    }

    fn cmd_model(args: &mut Args) -> Result<(), String> {
        let graph_path = PathBuf::from(args.next().ok_or("missing tree file")?);
        let mut obj_path: Option<PathBuf> = None;
        let mut graphml_path: Option<PathBuf> = None;
        let mut options = ModelOptions::default();
        let mut curved = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--obj" => obj_path = Some(PathBuf::from(args.value("--obj")?)),
                "--graphml" => graphml_path = Some(PathBuf::from(args.value("--graphml")?)),
                "--sides" => options.num_sides = args.number("--sides")?,
                "--curved" => curved = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let mut graph =
            VesselGraph::load(&graph_path).map_err(|e| format!("read {}: {e}", graph_path.display()))?;
        if graph.validate_tree().is_err() {
            let flipped = orient_edges(&mut graph);
            log::info!("oriented tree, {flipped} edges reversed");
        }
        graph.validate_tree().map_err(|e| e.to_string())?;

        let model = if curved {
            let factory = CurvedTree::prepare(&mut graph, CurveOptions::default()).map_err(|e| e.to_string())?;
            TreeModel::build(&graph, &factory, &options)
        } else {
            TreeModel::build(&graph, &StraightFactory, &options)
        }
        .map_err(|e| e.to_string())?;

        let obj_path = obj_path.unwrap_or_else(|| graph_path.with_extension("obj"));
        let name = stem(&obj_path);
        model.write_obj(&obj_path, &name).map_err(|e| e.to_string())?;
        eprintln!("wrote {}", obj_path.display());

        if let Some(path) = graphml_path.as_deref() {
            graph.save_graphml(path).map_err(|e| e.to_string())?;
            eprintln!("wrote {}", path.display());
        }

        eprintln!(
            "{name}: vertices={} triangles={} capped={} fallback={}",
            model.mesh.vertex_count(),
            model.mesh.triangle_count(),
            model.report.capped.len(),
            model.report.fallback.len()
        );
        for (node, reason) in &model.report.fallback {
            eprintln!("  fallback at {node}: {reason}");
        }
        Ok(())
    }

    fn cmd_generate(args: &mut Args) -> Result<(), String> {
        let organ_path = PathBuf::from(args.next().ok_or("missing organ mesh")?);
        let mut config_path: Option<PathBuf> = None;
        let mut out_dir: Option<PathBuf> = None;
        let mut work_dir: Option<PathBuf> = None;
        let mut seed: Option<u64> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config_path = Some(PathBuf::from(args.value("--config")?)),
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--work-dir" => work_dir = Some(PathBuf::from(args.value("--work-dir")?)),
                "--seed" => seed = Some(args.number("--seed")?),
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }
        let config_path = config_path.ok_or("generate requires --config")?;
        let out_dir = out_dir.ok_or("generate requires --out-dir")?;
        let work_dir = work_dir.unwrap_or_else(|| out_dir.join("work"));

        let mut config = VascularConfig::load(&config_path).map_err(|e| e.to_string())?;
        if let Some(seed) = seed {
            config.seed = seed;
        }
        if config.vessels.is_empty() {
            return Err(format!("{} lists no vessels", config_path.display()));
        }
        let organ = read_obj(&organ_path).map_err(|e| format!("read {}: {e}", organ_path.display()))?;
        fs::create_dir_all(&out_dir).map_err(|e| format!("create out dir: {e}"))?;

        match config.profile {
            ProfileKind::Generic => generate_with(&config, GenericProfile, &organ_path, &organ, &out_dir, &work_dir),
            ProfileKind::Liver => {
                let profile = config.liver_profile();
                generate_with(&config, profile, &organ_path, &organ, &out_dir, &work_dir)
            }
        }
    }

    fn generate_with<P: OrganProfile>(
        config: &VascularConfig,
        profile: P,
        organ_path: &Path,
        organ: &vascu_engine::geom::GeomMesh,
        out_dir: &Path,
        work_dir: &Path,
    ) -> Result<(), String> {
        let params = config.map_params().map_err(|e| e.to_string())?;
        let mut generator = VasculatureGenerator::new(
            config.process_engine(),
            profile,
            config.vessel_descriptors(),
            config.generator_settings(),
            config.seed,
        );
        log::info!("generating {} trees for {}", generator.vessels().len(), organ_path.display());
        let models = generator
            .run(organ, &params, work_dir)
            .map_err(|e| e.to_string())?;

        for (file_name, model) in &models {
            let path = out_dir.join(file_name);
            model.write_obj(&path, &stem(&path)).map_err(|e| e.to_string())?;
            eprintln!(
                "wrote {} (vertices={} capped={} fallback={})",
                path.display(),
                model.mesh.vertex_count(),
                model.report.capped.len(),
                model.report.fallback.len()
            );
        }
        Ok(())
    }

    fn stem(path: &Path) -> String {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("tree")
            .to_string()
    }

    fn write_text_file(path: &Path, text: &str) -> Result<(), String> {
        fs::write(path, text).map_err(|e| format!("write {}: {e}", path.display()))?;
        eprintln!("wrote {}", path.display());
        Ok(())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }

        fn number<T: std::str::FromStr>(&mut self, flag: &str) -> Result<T, String> {
            let value = self.value(flag)?;
            value
                .parse()
                .map_err(|_| format!("invalid value `{value}` for {flag}"))
        }
    }
}
