//! Pseudo electron density: accumulation from wavefunctions, symmetrization,
//! mixing, interpolation to the fine grid and compensation charges.

mod kpoint;
mod nonspin;
mod nucleus;
mod setup;
mod spin;

pub mod model;

pub use kpoint::*;
pub use nucleus::*;
pub use setup::*;

use control::Control;
use gpcomm::Communicator;
use gpconsts::*;
use gpgrid::Array3;
use griddesc::{GridDescriptor, GridError};
use mixing::{AtomicDensityMatrices, DensityMixer, MixingError};
use poisson::{PoissonError, PoissonSolver};
use symmetry::Symmetry;
use thiserror::Error;
use tracing::debug;
use transformer::{Transformer, TransformerError};

#[derive(Error, Debug)]
pub enum DensityError {
    #[error("charge not conserved: excess = {excess:.7}")]
    ChargeNotConserved { excess: f64 },

    #[error("implausible spin scaling factors x = {x:.6}, y = {y:.6}")]
    DegenerateMoment { x: f64, y: f64 },

    #[error("grid refinement {0} is not supported (use 1, 2 or 4)")]
    UnsupportedRefinement(usize),

    #[error(transparent)]
    Poisson(#[from] PoissonError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Transformer(#[from] TransformerError),

    #[error(transparent)]
    Mixing(#[from] MixingError),
}

pub type DensityResult<T> = Result<T, DensityError>;

/// Density of the coarse grid `gd` and the fine grid `finegd`.
pub struct Density {
    gd: GridDescriptor,
    finegd: GridDescriptor,
    nspin: usize,
    hund: bool,
    fixdensity: bool,
    strict_moment_check: bool,
    poisson_eps: f64,
    poisson_maxcharge: f64,

    // net charge including ionic cores not described by the setups
    charge: f64,
    nvalence: f64,
    nvalence0: f64,

    nuclei: Vec<Nucleus>,
    my_atoms: Vec<usize>,

    nct: Array3<f64>,
    nt_s: Vec<Array3<f64>>,
    nt_s_fine: Vec<Array3<f64>>,
    nt_fine: Array3<f64>,
    rhot_fine: Array3<f64>,
    d_asp: AtomicDensityMatrices,

    interpolator: Transformer,
    mixer: Box<dyn DensityMixer>,
}

impl Density {
    pub fn new(
        control: &Control,
        gd: &GridDescriptor,
        nuclei: Vec<Nucleus>,
        comm: &dyn Communicator,
    ) -> DensityResult<Density> {
        let nspin = control.get_nspin();
        let finegd = gd.refine();

        let nvalence0: f64 = nuclei.iter().map(|n| n.get_setup().get_nvalence()).sum();
        let nvalence = nvalence0 - control.get_charge();

        let charge = control.get_charge()
            + nuclei
                .iter()
                .map(|n| {
                    let s = n.get_setup();
                    s.get_z() - s.get_nvalence() - s.get_ncore()
                })
                .sum::<f64>();

        let my_atoms: Vec<usize> = nuclei
            .iter()
            .enumerate()
            .filter(|(_, n)| n.get_rank() == comm.rank())
            .map(|(a, _)| a)
            .collect();

        let mut d_asp = AtomicDensityMatrices::new();
        for &a in my_atoms.iter() {
            let np = nuclei[a].get_setup().get_np();
            d_asp.insert(a, vec![vec![0.0; np]; nspin]);
        }

        let interpolator = Transformer::new(gd, &finegd, control.get_interpolation_nn())?;
        let mixer = mixing::new(control, gd)?;

        let nt_fine = finegd.zeros();

        let mut density = Density {
            gd: gd.clone(),
            finegd: finegd.clone(),
            nspin,
            hund: control.get_hund(),
            fixdensity: control.get_fixdensity(),
            strict_moment_check: control.get_strict_moment_check(),
            poisson_eps: control.get_poisson_eps(),
            poisson_maxcharge: control.get_poisson_maxcharge(),
            charge,
            nvalence,
            nvalence0,
            nuclei,
            my_atoms,
            nct: gd.zeros(),
            nt_s: gd.zeros_spin(nspin),
            nt_s_fine: finegd.zeros_spin(nspin),
            nt_fine,
            rhot_fine: finegd.zeros(),
            d_asp,
            interpolator,
            mixer,
        };

        density.set_positions(comm);

        Ok(density)
    }

    pub fn get_gd(&self) -> &GridDescriptor {
        &self.gd
    }

    pub fn get_finegd(&self) -> &GridDescriptor {
        &self.finegd
    }

    pub fn get_nspin(&self) -> usize {
        self.nspin
    }

    pub fn get_charge(&self) -> f64 {
        self.charge
    }

    pub fn get_nvalence(&self) -> f64 {
        self.nvalence
    }

    pub fn get_nuclei(&self) -> &[Nucleus] {
        &self.nuclei
    }

    /// Pseudo density per spin on the coarse grid.
    pub fn get_density_array(&self) -> &[Array3<f64>] {
        &self.nt_s
    }

    pub fn get_fine_density_array(&self) -> &[Array3<f64>] {
        &self.nt_s_fine
    }

    /// Total pseudo density on the fine grid, valid after
    /// `update_pseudo_charge`.
    pub fn get_total_fine_density(&self) -> &Array3<f64> {
        &self.nt_fine
    }

    /// Compensated charge density on the fine grid.
    pub fn get_rhot(&self) -> &Array3<f64> {
        &self.rhot_fine
    }

    pub fn get_density_matrices(&self) -> &AtomicDensityMatrices {
        &self.d_asp
    }

    pub fn get_charge_sloshing(&self) -> Option<f64> {
        self.mixer.get_charge_sloshing()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixdensity
    }

    pub fn set_fixdensity(&mut self, fixdensity: bool) {
        self.fixdensity = fixdensity;
    }

    /// Density from a superposition of atomic densities, scaled so that
    /// pseudo density plus compensation charges give the net charge, then
    /// handed to the mixer and interpolated.
    pub fn initialize(&mut self, comm: &dyn Communicator) -> DensityResult<()> {
        for nt in self.nt_s.iter_mut() {
            nt.assign(&self.nct);
        }

        for (a, nucleus) in self.nuclei.iter().enumerate() {
            let setup = nucleus.get_setup();
            let f_si = initial_occupation_numbers(setup, nucleus.get_magmom(), self.hund, 0.0, self.nspin);

            nucleus.add_atomic_density(&mut self.nt_s, &self.gd, &f_si);

            if let Some(d_sp) = self.d_asp.get_mut(&a) {
                *d_sp = initial_density_matrix(setup, &f_si);
            }
        }

        if (self.nvalence - self.nvalence0).abs() > EPS9 {
            let x = self.nvalence / self.nvalence0;
            for d_sp in self.d_asp.values_mut() {
                scale_matrices(d_sp, x);
            }
            for nt in self.nt_s.iter_mut() {
                nt.scale(x);
            }
        }

        self.update_multipole_moments(comm);

        if self.nspin == 1 {
            self.normalize_nonspin(comm);
        } else {
            self.normalize_spin(comm)?;
        }

        self.mixer.mix(&mut self.nt_s, &mut self.d_asp, comm);

        self.interpolate_pseudo_density(comm);

        Ok(())
    }

    /// New pseudo density from the occupied states; a no-op for a fixed
    /// density. `kpt_comm` sums the contributions of k-points and bands
    /// distributed over other ranks.
    pub fn update(
        &mut self,
        kpts: &[KPoint],
        symmetry: Option<&Symmetry>,
        comm: &dyn Communicator,
        kpt_comm: &dyn Communicator,
    ) {
        if self.fixdensity {
            return;
        }

        for nt in self.nt_s.iter_mut() {
            nt.set_value(0.0);
        }

        for kpt in kpts.iter() {
            kpt.add_to_density(&mut self.nt_s[kpt.get_spin()]);
        }

        for nt in self.nt_s.iter_mut() {
            kpt_comm.sum_slice(nt.as_mut_slice());
            nt.add_from(&self.nct);
        }

        for &a in self.my_atoms.iter() {
            let ni = self.nuclei[a].get_setup().get_ni();
            let mut d_sii = vec![vec![vec![0.0; ni]; ni]; self.nspin];

            for kpt in kpts.iter() {
                kpt.add_to_density_matrix(a, &mut d_sii[kpt.get_spin()]);
            }

            let mut d_sp: Vec<Vec<f64>> = d_sii.iter().map(|d_ii| utility::pack(d_ii)).collect();
            for d_p in d_sp.iter_mut() {
                kpt_comm.sum_slice(d_p);
            }

            self.d_asp.insert(a, d_sp);
        }

        if let Some(symmetry) = symmetry {
            for nt in self.nt_s.iter_mut() {
                symmetry.symmetrize(nt, &self.gd);
            }
            self.symmetrize_density_matrices(symmetry, comm);
        }

        self.mixer.mix(&mut self.nt_s, &mut self.d_asp, comm);

        self.interpolate_pseudo_density(comm);
    }

    // all atoms' matrices of one spin, broadcast from their owners
    fn gather_density_matrices(&self, s: usize, comm: &dyn Communicator) -> Vec<Vec<f64>> {
        self.nuclei
            .iter()
            .enumerate()
            .map(|(a, nucleus)| {
                let mut d_p = match self.d_asp.get(&a) {
                    Some(d_sp) => d_sp[s].clone(),
                    None => vec![0.0; nucleus.get_setup().get_np()],
                };
                comm.broadcast_slice(&mut d_p, nucleus.get_rank());
                d_p
            })
            .collect()
    }

    fn symmetrize_density_matrices(&mut self, symmetry: &Symmetry, comm: &dyn Communicator) {
        let l_aj: Vec<Vec<usize>> = self
            .nuclei
            .iter()
            .map(|n| n.get_setup().get_l_j().to_vec())
            .collect();

        for s in 0..self.nspin {
            let d_ap = self.gather_density_matrices(s, comm);
            let d_ap = symmetry.symmetrize_atomic(&d_ap, &l_aj);

            for (a, d_p) in d_ap.into_iter().enumerate() {
                if let Some(d_sp) = self.d_asp.get_mut(&a) {
                    d_sp[s] = d_p;
                }
            }
        }
    }

    /// Interpolate every spin channel to the fine grid. With a
    /// non-periodic axis the fine density is rescaled to the coarse
    /// integral.
    pub fn interpolate_pseudo_density(&mut self, comm: &dyn Communicator) {
        for (nt, nt_fine) in self.nt_s.iter().zip(self.nt_s_fine.iter_mut()) {
            self.interpolator.apply(nt, nt_fine);
        }

        if self.gd.is_periodic() {
            return;
        }

        for (nt, nt_fine) in self.nt_s.iter().zip(self.nt_s_fine.iter_mut()) {
            let nt0 = self.gd.integrate(nt, comm);
            let nt1 = self.finegd.integrate(nt_fine, comm);
            if nt1.abs() > EPS20 {
                nt_fine.scale(nt0 / nt1);
            }
        }
    }

    fn update_multipole_moments(&mut self, comm: &dyn Communicator) {
        for (a, nucleus) in self.nuclei.iter_mut().enumerate() {
            if let Some(d_sp) = self.d_asp.get(&a) {
                nucleus.calculate_multipole_moments(d_sp);
            }
            nucleus.broadcast_multipole_moments(comm);
        }
    }

    /// Total fine-grid pseudo density plus compensation charges. Fails when
    /// the integral differs from minus the net charge by more than
    /// `CHARGE_TOLERANCE`.
    pub fn update_pseudo_charge(&mut self, comm: &dyn Communicator) -> DensityResult<()> {
        self.nt_fine.assign(&self.nt_s_fine[0]);
        for nt in self.nt_s_fine.iter().skip(1) {
            self.nt_fine.add_from(nt);
        }

        self.rhot_fine.assign(&self.nt_fine);

        self.update_multipole_moments(comm);

        for nucleus in self.nuclei.iter() {
            nucleus.add_compensation_charge(&mut self.rhot_fine);
        }

        let excess = self.finegd.integrate(&self.rhot_fine, comm) + self.charge;
        debug!(excess, "charge check");

        if excess.abs() > CHARGE_TOLERANCE {
            return Err(DensityError::ChargeNotConserved { excess });
        }

        Ok(())
    }

    /// Hartree potential of `rhot` on the fine grid, starting from the
    /// current content of `vht`. Returns the Poisson iteration count.
    pub fn solve_hartree(
        &self,
        poisson: &mut PoissonSolver,
        vht: &mut Array3<f64>,
        comm: &dyn Communicator,
    ) -> DensityResult<usize> {
        let niter = poisson.solve(
            vht,
            &self.rhot_fine,
            self.poisson_eps,
            Some(-self.charge),
            self.poisson_maxcharge,
            comm,
        )?;

        debug!(niter, "Hartree potential");

        Ok(niter)
    }

    /// New atomic positions: the mixer history no longer applies and the
    /// core density is rebuilt.
    pub fn move_atoms(&mut self, spos_ac: &[[f64; 3]], comm: &dyn Communicator) {
        assert_eq!(spos_ac.len(), self.nuclei.len());

        for (nucleus, spos) in self.nuclei.iter_mut().zip(spos_ac.iter()) {
            nucleus.set_spos(*spos);
        }

        self.set_positions(comm);
    }

    fn set_positions(&mut self, comm: &dyn Communicator) {
        for nucleus in self.nuclei.iter_mut() {
            nucleus.initialize_compensation_charges(&self.finegd, comm);
        }

        self.mixer.reset(&self.my_atoms);

        self.nct.set_value(0.0);
        for nucleus in self.nuclei.iter() {
            nucleus.add_smooth_core_density(&mut self.nct, &self.gd, self.nspin);
        }
    }

    /// Per-atom magnetic moments; all zero without spin polarization.
    pub fn calculate_local_magnetic_moments(&mut self, comm: &dyn Communicator) -> Vec<f64> {
        if self.nspin == 1 {
            return vec![0.0; self.nuclei.len()];
        }

        let mut spin_density = self.nt_s_fine[0].clone();
        spin_density.substract(&self.nt_s_fine[1]);

        let mut moments = Vec::with_capacity(self.nuclei.len());

        for (a, nucleus) in self.nuclei.iter_mut().enumerate() {
            let mut mom = [0.0];
            if let Some(d_sp) = self.d_asp.get(&a) {
                mom[0] = nucleus.calculate_magnetic_moment(d_sp, &spin_density, &self.finegd, comm);
            }
            comm.broadcast_slice(&mut mom, nucleus.get_rank());
            moments.push(mom[0]);
        }

        moments
    }

    /// All-electron density per spin on the coarse grid (1), the fine grid
    /// (2) or a grid refined once more (4).
    pub fn get_all_electron_density(
        &self,
        gridrefinement: usize,
        comm: &dyn Communicator,
    ) -> DensityResult<(GridDescriptor, Vec<Array3<f64>>)> {
        let (gd, mut n_s) = match gridrefinement {
            1 => (self.gd.clone(), self.nt_s.clone()),
            2 => (self.finegd.clone(), self.nt_s_fine.clone()),
            4 => {
                let gd = self.finegd.refine();
                let mut interpolator = Transformer::new(&self.finegd, &gd, 3)?;
                let mut n_s = gd.zeros_spin(self.nspin);
                for (nt, n) in self.nt_s_fine.iter().zip(n_s.iter_mut()) {
                    interpolator.apply(nt, n);
                }
                (gd, n_s)
            }
            other => return Err(DensityError::UnsupportedRefinement(other)),
        };

        let d_sap: Vec<Vec<Vec<f64>>> = (0..self.nspin).map(|s| self.gather_density_matrices(s, comm)).collect();

        for (a, nucleus) in self.nuclei.iter().enumerate() {
            let d_sp: Vec<Vec<f64>> = d_sap.iter().map(|d_ap| d_ap[a].clone()).collect();
            nucleus.add_density_correction(&mut n_s, &d_sp, &gd);
        }

        Ok((gd, n_s))
    }
}

fn scale_matrices(d_sp: &mut [Vec<f64>], x: f64) {
    for d_p in d_sp.iter_mut() {
        for d in d_p.iter_mut() {
            *d *= x;
        }
    }
}
