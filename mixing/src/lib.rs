mod pulay;
pub use pulay::*;

use control::Control;
use gpcomm::Communicator;
use gpgrid::Array3;
use griddesc::GridDescriptor;
use std::collections::BTreeMap;
use stencil::Stencil;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixingError {
    #[error("mixing coefficient {0} is outside (0, 1]")]
    InvalidBeta(f64),

    #[error("mixing history must keep at least one step")]
    EmptyHistory,

    #[error("unsupported mixing metric '{0}'")]
    UnsupportedMetric(String),

    #[error("metric weight must be positive, got {0}")]
    InvalidWeight(f64),
}

pub type MixingResult<T> = Result<T, MixingError>;

/// Packed atomic density matrices by atom index, then spin.
pub type AtomicDensityMatrices = BTreeMap<usize, Vec<Vec<f64>>>;

pub trait DensityMixer {
    /// Replace the freshly computed densities and atomic density matrices
    /// by the next input in place.
    fn mix(&mut self, nt_sg: &mut [Array3<f64>], d_asp: &mut AtomicDensityMatrices, comm: &dyn Communicator);

    /// Forget the history; `my_atoms` are the atoms whose matrices are mixed
    /// from now on.
    fn reset(&mut self, my_atoms: &[usize]);

    fn get_charge_sloshing(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixerParameters {
    pub beta: f64,
    pub nmaxold: usize,
    pub metric: Option<f64>,
}

impl MixerParameters {
    pub fn from_control(control: &Control) -> MixingResult<MixerParameters> {
        let metric = match control.get_mix_metric() {
            "none" => None,
            "new" => Some(control.get_mix_weight()),
            other => return Err(MixingError::UnsupportedMetric(other.to_string())),
        };

        let p = MixerParameters {
            beta: control.get_mix_beta(),
            nmaxold: control.get_mix_nmaxold(),
            metric,
        };
        p.check()?;

        Ok(p)
    }

    pub fn check(&self) -> MixingResult<()> {
        if !(self.beta > 0.0 && self.beta <= 1.0) {
            return Err(MixingError::InvalidBeta(self.beta));
        }
        if self.nmaxold == 0 {
            return Err(MixingError::EmptyHistory);
        }
        if let Some(w) = self.metric {
            if !(w > 0.0) {
                return Err(MixingError::InvalidWeight(w));
            }
        }
        Ok(())
    }

    fn channel(&self, gd: &GridDescriptor) -> PulayChannel {
        let metric = self.metric.map(|w| Stencil::metric(gd, w));
        PulayChannel::new(gd, self.beta, self.nmaxold, metric)
    }
}

fn gather(d_asp: &AtomicDensityMatrices, my_atoms: &[usize], f: impl Fn(&[Vec<f64>]) -> Vec<f64>) -> Vec<f64> {
    let mut d = Vec::new();
    for a in my_atoms.iter() {
        if let Some(d_sp) = d_asp.get(a) {
            d.extend(f(d_sp));
        }
    }
    d
}

/// One independent history per spin channel.
#[derive(Debug)]
pub struct Mixer {
    channels: Vec<PulayChannel>,
    my_atoms: Vec<usize>,
}

impl Mixer {
    pub fn new(gd: &GridDescriptor, nspin: usize, params: &MixerParameters) -> MixingResult<Mixer> {
        params.check()?;

        Ok(Mixer {
            channels: (0..nspin).map(|_| params.channel(gd)).collect(),
            my_atoms: Vec::new(),
        })
    }
}

impl DensityMixer for Mixer {
    fn mix(&mut self, nt_sg: &mut [Array3<f64>], d_asp: &mut AtomicDensityMatrices, comm: &dyn Communicator) {
        assert_eq!(nt_sg.len(), self.channels.len());

        for (s, (nt_g, channel)) in nt_sg.iter_mut().zip(self.channels.iter_mut()).enumerate() {
            let mut d = gather(d_asp, &self.my_atoms, |d_sp| d_sp[s].clone());

            channel.mix(nt_g, &mut d, comm);

            let mut offset = 0;
            for a in self.my_atoms.iter() {
                if let Some(d_sp) = d_asp.get_mut(a) {
                    let np = d_sp[s].len();
                    d_sp[s].copy_from_slice(&d[offset..offset + np]);
                    offset += np;
                }
            }
        }
    }

    fn reset(&mut self, my_atoms: &[usize]) {
        self.my_atoms = my_atoms.to_vec();
        for c in self.channels.iter_mut() {
            c.reset();
        }
    }

    fn get_charge_sloshing(&self) -> Option<f64> {
        let mut total = None;
        for c in self.channels.iter() {
            if let Some(dnt) = c.get_charge_sloshing() {
                *total.get_or_insert(0.0) += dnt;
            }
        }
        total
    }
}

/// Mixes the total density of a spin-polarized system; the magnetization
/// density is taken over unmixed.
#[derive(Debug)]
pub struct MixerSum {
    channel: PulayChannel,
    gd: GridDescriptor,
    my_atoms: Vec<usize>,
}

impl MixerSum {
    pub fn new(gd: &GridDescriptor, params: &MixerParameters) -> MixingResult<MixerSum> {
        params.check()?;

        Ok(MixerSum {
            channel: params.channel(gd),
            gd: gd.clone(),
            my_atoms: Vec::new(),
        })
    }
}

impl DensityMixer for MixerSum {
    fn mix(&mut self, nt_sg: &mut [Array3<f64>], d_asp: &mut AtomicDensityMatrices, comm: &dyn Communicator) {
        assert_eq!(nt_sg.len(), 2);

        let mut nt_g = self.gd.zeros();
        nt_g.assign(&nt_sg[0]);
        nt_g.add_from(&nt_sg[1]);

        let mut dnt_g = nt_sg[0].clone();
        dnt_g.substract(&nt_sg[1]);

        let mut d = gather(d_asp, &self.my_atoms, |d_sp| {
            d_sp[0].iter().zip(d_sp[1].iter()).map(|(u, v)| u + v).collect()
        });

        self.channel.mix(&mut nt_g, &mut d, comm);

        nt_sg[0].assign(&nt_g);
        nt_sg[0].add_from(&dnt_g);
        nt_sg[0].scale(0.5);

        nt_sg[1].assign(&nt_g);
        nt_sg[1].substract(&dnt_g);
        nt_sg[1].scale(0.5);

        let mut offset = 0;
        for a in self.my_atoms.iter() {
            if let Some(d_sp) = d_asp.get_mut(a) {
                let np = d_sp[0].len();
                for p in 0..np {
                    let sum = d[offset + p];
                    let diff = d_sp[0][p] - d_sp[1][p];
                    d_sp[0][p] = 0.5 * (sum + diff);
                    d_sp[1][p] = 0.5 * (sum - diff);
                }
                offset += np;
            }
        }
    }

    fn reset(&mut self, my_atoms: &[usize]) {
        self.my_atoms = my_atoms.to_vec();
        self.channel.reset();
    }

    fn get_charge_sloshing(&self) -> Option<f64> {
        self.channel.get_charge_sloshing()
    }
}

/// The spin-summed mixer is used for spin-polarized systems unless the
/// magnetic moment is fixed at zero temperature.
pub fn new(control: &Control, gd: &GridDescriptor) -> MixingResult<Box<dyn DensityMixer>> {
    let params = MixerParameters::from_control(control)?;

    let nspin = control.get_nspin();

    let mixer: Box<dyn DensityMixer> = if nspin == 2 && (!control.get_fixmom() || control.get_width() != 0.0) {
        info!(beta = params.beta, nmaxold = params.nmaxold, "spin-summed density mixer");
        Box::new(MixerSum::new(gd, &params)?)
    } else {
        info!(beta = params.beta, nmaxold = params.nmaxold, nspin, "density mixer");
        Box::new(Mixer::new(gd, nspin, &params)?)
    };

    Ok(mixer)
}
