//! Built-in cheminformatics toolkit.
//!
//! The rest of the crate only talks to [`DescriptorProvider`]; the bundled
//! [`SmilesToolkit`] is one implementation and can be swapped for a binding
//! to a full toolkit.

pub mod descriptors;
pub mod smarts;
pub mod smiles;

pub use descriptors::Descriptors;
pub use smarts::{Pattern, SmartsError};
pub use smiles::{parse_smiles, Atom, Bond, BondOrder, Molecule, SmilesError};

/// Structure parsing and descriptor computation.
pub trait DescriptorProvider: Send + Sync {
    /// Parse an identifier into a structure, `None` when it is not a molecule.
    fn parse(&self, identifier: &str) -> Option<Molecule>;

    /// Compute the fixed descriptor set.
    fn descriptors(&self, molecule: &Molecule) -> Descriptors;
}

/// SMILES-based provider backed by the in-crate parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmilesToolkit;

impl DescriptorProvider for SmilesToolkit {
    fn parse(&self, identifier: &str) -> Option<Molecule> {
        match parse_smiles(identifier) {
            Ok(mol) => Some(mol),
            Err(e) => {
                tracing::debug!(identifier = %identifier, error = %e, "SMILES rejected");
                None
            }
        }
    }

    fn descriptors(&self, molecule: &Molecule) -> Descriptors {
        Descriptors::compute(molecule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolkit_parse() {
        let toolkit = SmilesToolkit;
        assert!(toolkit.parse("CCO").is_some());
        assert!(toolkit.parse("not a molecule").is_none());
    }

    #[test]
    fn test_toolkit_descriptors() {
        let toolkit = SmilesToolkit;
        let mol = toolkit.parse("O").unwrap();
        let d = toolkit.descriptors(&mol);
        assert_eq!(d.formula, "H2O");
        assert!((d.molecular_weight - 18.015).abs() < 0.01);
    }
}
