use clap::{Args, Parser, Subcommand};
use field_capture::{
    annotation::{AnnotationSession, DrawnItems},
    photos::PhotoLibrary,
    config::AppConfig,
    export::write_geojson,
    form::{FormField, MAX_PHOTOS},
    geometry::{DrawnShape, PolygonShape},
    logging,
    store::PolygonStore,
};
use log::{info, warn};
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult = Result<(), Box<dyn Error>>;

/// Command line front end for the field capture store.
#[derive(Parser)]
#[command(name = "field_capture_cli", version)]
struct Cli {
    /// Directory holding the database and the photo directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the polygon database if it does not exist.
    Init,
    /// Draw a polygon, fill in its form and save it.
    Add(AddArgs),
    /// List stored polygons.
    List {
        /// Print a JSON array instead of one line per polygon
        #[arg(long)]
        json: bool,
    },
    /// Delete every stored polygon.
    Clear,
    /// Export stored polygons to a GeoJSON FeatureCollection.
    ExportGeojson { output: PathBuf },
}

#[derive(Args)]
struct AddArgs {
    #[arg(long, default_value = "")]
    dni: String,
    #[arg(long, default_value = "")]
    apellido_paterno: String,
    #[arg(long, default_value = "")]
    apellido_materno: String,
    #[arg(long, default_value = "")]
    nombres: String,
    #[arg(long, default_value = "")]
    fecha_de_nacimiento: String,
    #[arg(long, default_value = "")]
    organizacion: String,
    #[arg(long, default_value = "")]
    participante: String,
    #[arg(long, default_value = "")]
    cultivo: String,
    /// Polygon as WKT, e.g. "POLYGON((x y, ...))"
    #[arg(long, conflicts_with = "geojson", required_unless_present = "geojson")]
    wkt: Option<String>,
    /// File holding the drawn polygon as GeoJSON
    #[arg(long)]
    geojson: Option<PathBuf>,
    /// JPEG file to attach; may be repeated
    #[arg(long = "photo")]
    photos: Vec<PathBuf>,
}

impl AddArgs {
    fn fields(&self) -> [(FormField, &str); 8] {
        [
            (FormField::Dni, self.dni.as_str()),
            (FormField::PaternalSurname, self.apellido_paterno.as_str()),
            (FormField::MaternalSurname, self.apellido_materno.as_str()),
            (FormField::GivenNames, self.nombres.as_str()),
            (FormField::BirthDate, self.fecha_de_nacimiento.as_str()),
            (FormField::Organization, self.organizacion.as_str()),
            (FormField::Participant, self.participante.as_str()),
            (FormField::Crop, self.cultivo.as_str()),
        ]
    }

    fn drawn_shape(&self) -> Result<DrawnShape, Box<dyn Error>> {
        let shape = match (&self.wkt, &self.geojson) {
            (Some(wkt), _) => PolygonShape::from_wkt(wkt)?,
            (None, Some(path)) => PolygonShape::decode(&std::fs::read_to_string(path)?)?,
            (None, None) => return Err("either --wkt or --geojson is required".into()),
        };
        Ok(DrawnShape::Polygon(shape.vertices().to_vec()))
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn Error>> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    std::fs::create_dir_all(&config.data_dir)?;
    Ok(config)
}

fn open_store(config: &AppConfig) -> Result<PolygonStore, Box<dyn Error>> {
    let path = config.database_path();
    info!("using database {}", path.display());
    Ok(PolygonStore::open(path)?)
}

fn add(config: &AppConfig, args: &AddArgs) -> CliResult {
    if args.photos.len() > MAX_PHOTOS {
        return Err(format!("at most {} photos can be attached", MAX_PHOTOS).into());
    }
    let store = open_store(config)?;
    let library = config.photo_library();
    let mut session =
        AnnotationSession::new(DrawnItems::new()).with_encoding(config.geometry_encoding);
    session.shape_created(args.drawn_shape()?)?;

    if let Some(form) = session.form_mut() {
        for (field, value) in args.fields() {
            form.enter_field(field, value);
        }
    }
    if let Some(Err(e)) = session.form().map(|form| form.validate()) {
        session.cancel()?;
        return Err(e.into());
    }

    let mut copied = Vec::new();
    let outcome = copy_photos(&library, &args.photos, &mut copied).and_then(|()| {
        if let Some(form) = session.form_mut() {
            for name in &copied {
                form.add_photo(name.clone())?;
            }
        }
        Ok(session.confirm(&store)?)
    });
    let dismissal = match outcome {
        Ok(dismissal) => dismissal,
        Err(e) => {
            discard_photos(&library, &copied);
            return Err(e);
        }
    };
    if let Some(saved) = dismissal.data {
        println!("Saved polygon {}", saved.id);
    }
    Ok(())
}

fn copy_photos(
    library: &PhotoLibrary,
    paths: &[PathBuf],
    copied: &mut Vec<String>,
) -> CliResult {
    for path in paths {
        let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        copied.push(library.save_from(file)?);
    }
    Ok(())
}

fn discard_photos(library: &PhotoLibrary, names: &[String]) {
    for name in names {
        if let Err(e) = library.remove(name) {
            warn!("could not remove photo {}: {}", name, e);
        }
    }
}

fn list(config: &AppConfig, json: bool) -> CliResult {
    let store = open_store(config)?;
    let records = store.list_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No polygons stored");
    }
    for r in &records {
        println!(
            "{}\t{}\t{} {}, {}\t{}\t{} photos",
            r.id,
            r.form.dni,
            r.form.paternal_surname,
            r.form.maternal_surname,
            r.form.given_names,
            r.form.crop,
            r.form.photos.len()
        );
    }
    Ok(())
}

fn run(cli: &Cli) -> CliResult {
    let config = load_config(cli)?;
    match &cli.command {
        Commands::Init => {
            let store = open_store(&config)?;
            println!("Initialized {} store at {}", config.app_name, store.location());
        }
        Commands::Add(args) => add(&config, args)?,
        Commands::List { json } => list(&config, *json)?,
        Commands::Clear => {
            let store = open_store(&config)?;
            println!("Removed {} polygons", store.clear()?);
        }
        Commands::ExportGeojson { output } => {
            let store = open_store(&config)?;
            write_geojson(output, &store.list_all()?)?;
            println!("Wrote {}", output.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
