use approx::assert_relative_eq;
use control::Control;
use density::model::atomic_orbital_kpoint;
use density::{Density, ModelSetup, Nucleus};
use gpcomm::SerialComm;
use griddesc::GridDescriptor;
use poisson::PoissonSolver;
use std::rc::Rc;
use symmetry::Symmetry;

fn run_hydrogen(pbc: bool, ctrl: &str) {
    let comm = SerialComm::new();

    let mut control = Control::new();
    control.read_str(ctrl).unwrap();

    let gd = GridDescriptor::new([16, 16, 16], [8.0; 3], [pbc; 3]).unwrap();
    let setup = Rc::new(ModelSetup::hydrogen(0.75));
    let nuclei = vec![Nucleus::new(setup, [0.5, 0.5, 0.5], 0.0)];

    let symmetry = Symmetry::new(&gd, &[[0.5, 0.5, 0.5]], &[0], 1e-8);

    let mut density = Density::new(&control, &gd, nuclei, &comm).unwrap();
    density.initialize(&comm).unwrap();
    density.update_pseudo_charge(&comm).unwrap();

    let finegd = density.get_finegd().clone();
    let mut poisson = PoissonSolver::new(
        &finegd,
        control.get_poisson_nn(),
        control.get_poisson_relax(),
        control.get_poisson_load_gauss(),
        &comm,
    )
    .unwrap();
    let mut vht = finegd.zeros();

    for _ in 0..4 {
        let kpt = atomic_orbital_kpoint(density.get_gd(), density.get_nuclei(), 0, &[1.0], &comm);
        density.update(&[kpt], Some(&symmetry), &comm, &comm);
        density.update_pseudo_charge(&comm).unwrap();

        let total = finegd.integrate(density.get_rhot(), &comm);
        assert!((total + density.get_charge()).abs() < 1e-7);

        density.solve_hartree(&mut poisson, &mut vht, &comm).unwrap();
    }

    // pseudo electrons on the grid, the remainder in the augmentation
    let nt = finegd.integrate(density.get_total_fine_density(), &comm);
    assert_relative_eq!(nt, 0.75, epsilon = 1e-3);
}

#[test]
fn test_hydrogen_periodic() {
    run_hydrogen(true, "");
}

#[test]
fn test_hydrogen_in_a_box() {
    run_hydrogen(false, "poisson_nn = M\nmix_nmaxold = 5\nmix_metric = new");
}

#[test]
fn test_hydrogen_jacobi() {
    run_hydrogen(true, "poisson_relax = J\npoisson_nn = 2\ninterpolation_nn = 2");
}
