//! Molecular descriptors computed from the parsed graph.
//!
//! Values are estimates in the spirit of the usual cheminformatics
//! descriptors: average molecular weight, an atom-contribution logP, Ertl
//! polar surface area restricted to N and O, Lipinski donor/acceptor
//! counts, and simple ring statistics.

use super::smiles::{BondOrder, Molecule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const HYDROGEN_MASS: f64 = 1.008;

/// Fixed descriptor set consumed by toxicity prediction and section assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    pub molecular_weight: f64,
    pub logp: f64,
    pub tpsa: f64,
    pub h_bond_donors: u32,
    pub h_bond_acceptors: u32,
    pub rotatable_bonds: u32,
    pub ring_count: u32,
    pub aromatic_ring_count: u32,
    pub heavy_atom_count: u32,
    pub formal_charge: i32,
    pub fraction_csp3: f64,
    pub formula: String,
}

impl Descriptors {
    /// Compute every descriptor for `mol`.
    pub fn compute(mol: &Molecule) -> Self {
        Self {
            molecular_weight: round2(molecular_weight(mol)),
            logp: round2(logp(mol)),
            tpsa: round2(tpsa(mol)),
            h_bond_donors: h_bond_donors(mol),
            h_bond_acceptors: h_bond_acceptors(mol),
            rotatable_bonds: rotatable_bonds(mol),
            ring_count: ring_count(mol),
            aromatic_ring_count: aromatic_ring_count(mol),
            heavy_atom_count: mol.atoms().iter().filter(|a| !a.is("H")).count() as u32,
            formal_charge: mol.atoms().iter().map(|a| a.charge as i32).sum(),
            fraction_csp3: round2(fraction_csp3(mol)),
            formula: hill_formula(mol),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn molecular_weight(mol: &Molecule) -> f64 {
    mol.atoms()
        .iter()
        .map(|a| a.element.mass + a.hydrogens as f64 * HYDROGEN_MASS)
        .sum()
}

/// Molecular formula in Hill order (C, H, then alphabetical; alphabetical
/// throughout when carbon is absent).
pub fn hill_formula(mol: &Molecule) -> String {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for atom in mol.atoms() {
        *counts.entry(atom.symbol()).or_default() += 1;
        if atom.hydrogens > 0 {
            *counts.entry("H").or_default() += atom.hydrogens as u32;
        }
    }

    let mut out = String::new();
    let mut push = |symbol: &str, n: u32| {
        out.push_str(symbol);
        if n > 1 {
            out.push_str(&n.to_string());
        }
    };

    if let Some(c) = counts.remove("C") {
        push("C", c);
        if let Some(h) = counts.remove("H") {
            push("H", h);
        }
    }
    for (symbol, n) in counts {
        push(symbol, n);
    }
    out
}

fn has_hetero_neighbor(mol: &Molecule, idx: usize) -> bool {
    mol.neighbors(idx)
        .iter()
        .any(|(n, _)| !matches!(mol.atom(*n).symbol(), "C" | "H"))
}

/// Atom-contribution octanol/water partition estimate.
pub fn logp(mol: &Molecule) -> f64 {
    let mut total = 0.0;
    for (idx, atom) in mol.atoms().iter().enumerate() {
        let h = atom.hydrogens as f64;
        let contribution = match atom.symbol() {
            "C" if atom.aromatic => 0.29 + 0.12 * h,
            "C" if has_hetero_neighbor(mol, idx) => -0.10 + 0.12 * h,
            "C" => 0.15 + 0.12 * h,
            "N" if atom.aromatic => -0.50,
            "N" => -0.70 - 0.10 * h,
            "O" if atom.aromatic => 0.10,
            "O" if h > 0.0 => -0.55,
            "O" => -0.35,
            "S" => 0.60,
            "P" => -0.20,
            "F" => 0.40,
            "Cl" => 0.70,
            "Br" => 0.90,
            "I" => 1.15,
            "Si" => 0.50,
            "H" => 0.12,
            _ => -0.30,
        };
        total += contribution;
        if atom.charge != 0 {
            total -= 1.0;
        }
    }
    total
}

/// Topological polar surface area from N and O environments.
pub fn tpsa(mol: &Molecule) -> f64 {
    let mut total = 0.0;
    for (idx, atom) in mol.atoms().iter().enumerate() {
        let bonds: Vec<BondOrder> = mol
            .neighbors(idx)
            .iter()
            .map(|(_, b)| mol.bond(*b).order)
            .collect();
        let double = bonds.contains(&BondOrder::Double);
        let triple = bonds.contains(&BondOrder::Triple);
        let h = atom.hydrogens;
        total += match atom.symbol() {
            "N" if atom.aromatic => {
                if h > 0 {
                    15.79
                } else {
                    12.89
                }
            }
            "N" if atom.charge > 0 => {
                if double {
                    11.68
                } else {
                    27.64_f64.min(4.36 + 8.0 * h as f64)
                }
            }
            "N" if triple => 23.79,
            "N" if double => {
                if h > 0 {
                    23.85
                } else {
                    12.36
                }
            }
            "N" => match h {
                0 => 3.24,
                1 => 12.03,
                _ => 26.02,
            },
            "O" if atom.aromatic => 13.14,
            "O" if atom.charge < 0 => 23.06,
            "O" if double => 17.07,
            "O" if h > 0 => 20.23,
            "O" => 9.23,
            _ => 0.0,
        };
    }
    total
}

/// Lipinski donors: N or O atoms carrying at least one hydrogen.
pub fn h_bond_donors(mol: &Molecule) -> u32 {
    mol.atoms()
        .iter()
        .filter(|a| matches!(a.symbol(), "N" | "O") && a.hydrogens > 0)
        .count() as u32
}

/// Lipinski acceptors: N and O atoms that are not positively charged.
pub fn h_bond_acceptors(mol: &Molecule) -> u32 {
    mol.atoms()
        .iter()
        .filter(|a| matches!(a.symbol(), "N" | "O") && a.charge <= 0)
        .count() as u32
}

/// Single, acyclic bonds between two non-terminal heavy atoms.
pub fn rotatable_bonds(mol: &Molecule) -> u32 {
    let heavy_degree = |idx: usize| {
        mol.neighbors(idx)
            .iter()
            .filter(|(n, _)| !mol.atom(*n).is("H"))
            .count()
    };
    mol.bonds()
        .iter()
        .filter(|b| {
            b.order == BondOrder::Single
                && !b.in_ring
                && heavy_degree(b.a) > 1
                && heavy_degree(b.b) > 1
                && !has_triple(mol, b.a)
                && !has_triple(mol, b.b)
        })
        .count() as u32
}

fn has_triple(mol: &Molecule, idx: usize) -> bool {
    mol.neighbors(idx)
        .iter()
        .any(|(_, b)| mol.bond(*b).order == BondOrder::Triple)
}

/// Cyclomatic number: independent rings.
pub fn ring_count(mol: &Molecule) -> u32 {
    let edges = mol.bonds().len() as i64;
    let nodes = mol.atoms().len() as i64;
    let components = mol.component_count() as i64;
    (edges - nodes + components).max(0) as u32
}

/// Small rings whose bonds are all aromatic.
pub fn aromatic_ring_count(mol: &Molecule) -> u32 {
    mol.rings()
        .iter()
        .filter(|ring| {
            (0..ring.len()).all(|i| {
                mol.bond_between(ring[i], ring[(i + 1) % ring.len()])
                    .is_some_and(|b| b.order == BondOrder::Aromatic)
            })
        })
        .count() as u32
}

/// Share of carbons with only single bonds.
pub fn fraction_csp3(mol: &Molecule) -> f64 {
    let carbons: Vec<usize> = (0..mol.atoms().len())
        .filter(|i| mol.atom(*i).is("C"))
        .collect();
    if carbons.is_empty() {
        return 0.0;
    }
    let sp3 = carbons
        .iter()
        .filter(|i| {
            !mol.atom(**i).aromatic
                && mol
                    .neighbors(**i)
                    .iter()
                    .all(|(_, b)| mol.bond(*b).order == BondOrder::Single)
        })
        .count();
    sp3 as f64 / carbons.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::smiles::parse_smiles;

    fn describe(smiles: &str) -> Descriptors {
        Descriptors::compute(&parse_smiles(smiles).unwrap())
    }

    #[test]
    fn test_aspirin() {
        let d = describe("CC(=O)OC1=CC=CC=C1C(=O)O");
        assert_eq!(d.formula, "C9H8O4");
        assert!((d.molecular_weight - 180.16).abs() < 0.05);
        assert_eq!(d.h_bond_donors, 1);
        assert_eq!(d.h_bond_acceptors, 4);
        assert_eq!(d.ring_count, 1);
        assert_eq!(d.aromatic_ring_count, 1);
        assert_eq!(d.heavy_atom_count, 13);
        // Ertl reference value is 63.6
        assert!((d.tpsa - 63.6).abs() < 0.1);
    }

    #[test]
    fn test_caffeine_formula() {
        let d = describe("CN1C=NC2=C1C(=O)N(C(=O)N2C)C");
        assert_eq!(d.formula, "C8H10N4O2");
        assert!((d.molecular_weight - 194.19).abs() < 0.05);
        assert_eq!(d.aromatic_ring_count, 2);
    }

    #[test]
    fn test_logp_orders_by_polarity() {
        let hexane = describe("CCCCCC").logp;
        let ethanol = describe("CCO").logp;
        let glycerol = describe("OCC(O)CO").logp;
        assert!(hexane > ethanol);
        assert!(ethanol > glycerol);
        assert!(hexane > 2.0);
    }

    #[test]
    fn test_rotatable_and_csp3() {
        let butane = describe("CCCC");
        assert_eq!(butane.rotatable_bonds, 1);
        assert_eq!(butane.fraction_csp3, 1.0);
        let benzene = describe("c1ccccc1");
        assert_eq!(benzene.rotatable_bonds, 0);
        assert_eq!(benzene.fraction_csp3, 0.0);
    }

    #[test]
    fn test_salt_formula_and_charge() {
        let d = describe("[Na+].[Cl-]");
        assert_eq!(d.formula, "ClNa");
        assert_eq!(d.formal_charge, 0);
        assert_eq!(d.ring_count, 0);
    }
}
