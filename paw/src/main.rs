use control::Control;
use density::model::atomic_orbital_kpoint;
use density::{Density, KPoint, ModelSetup, Nucleus};
use gpcomm::SerialComm;
use griddesc::GridDescriptor;
use poisson::PoissonSolver;
use std::{error::Error, path::Path, rc::Rc};
use symmetry::Symmetry;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONTROL_FILE: &str = "in.ctrl";

// <phit|phit> of the model hydrogen setup
const HYDROGEN_PSEUDO_NORM: f64 = 0.75;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let stopwatch_main = std::time::Instant::now();

    let comm = SerialComm::new();

    // read in control parameters

    let mut control = Control::new();

    if Path::new(CONTROL_FILE).exists() {
        control.read_file(CONTROL_FILE)?;
    } else {
        info!("{} not found, running with defaults", CONTROL_FILE);
    }

    control.display();

    // coarse grid and a hydrogen atom in the middle of the cell

    let gd = GridDescriptor::new(control.get_grid(), control.get_cell(), control.get_pbc())?;

    let spos = [0.5, 0.5, 0.5];
    let magmom = if control.is_spin() { 1.0 } else { 0.0 };
    let setup = Rc::new(ModelSetup::hydrogen(HYDROGEN_PSEUDO_NORM));
    let nuclei = vec![Nucleus::new(setup, spos, magmom)];

    let symmetry = Symmetry::new(&gd, &[spos], &[0], 1e-8);
    info!(nops = symmetry.get_nops(), "point-group operations");

    // initial density

    let mut density = Density::new(&control, &gd, nuclei, &comm)?;

    density.initialize(&comm)?;
    density.update_pseudo_charge(&comm)?;

    // Hartree potential on the fine grid

    let finegd = density.get_finegd().clone();

    let mut poisson = PoissonSolver::new(
        &finegd,
        control.get_poisson_nn(),
        control.get_poisson_relax(),
        control.get_poisson_load_gauss(),
        &comm,
    )?;

    let mut vht = finegd.zeros();

    let niter = density.solve_hartree(&mut poisson, &mut vht, &comm)?;
    info!(niter, "Hartree potential of the initial density");

    // one density update from the occupied 1s orbital

    let kpts: Vec<KPoint> = (0..density.get_nspin())
        .map(|s| {
            let f = if s == 0 { 1.0 } else { 0.0 };
            atomic_orbital_kpoint(&gd, density.get_nuclei(), s, &[f], &comm)
        })
        .collect();

    density.update(&kpts, Some(&symmetry), &comm, &comm);
    density.update_pseudo_charge(&comm)?;

    let niter = density.solve_hartree(&mut poisson, &mut vht, &comm)?;
    info!(niter, dnt = ?density.get_charge_sloshing(), "density update");

    if density.get_nspin() == 2 {
        let moments = density.calculate_local_magnetic_moments(&comm);
        info!(?moments, "local magnetic moments");
    }

    let (gd_ae, n_s) = density.get_all_electron_density(2, &comm)?;
    let electrons: f64 = n_s.iter().map(|n| gd_ae.integrate(n, &comm)).sum();
    info!(electrons, "all-electron density on the fine grid");

    info!(elapsed = ?stopwatch_main.elapsed(), "done");

    Ok(())
}
