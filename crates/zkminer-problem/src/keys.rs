use crate::circuit::CompiledCircuit;
use crate::error::Result;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey as ArkProvingKey, VerifyingKey as ArkVerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::rngs::OsRng;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::info;

macro_rules! key_wrapper {
    ($name:ident, $inner:ty) => {
        #[derive(Clone)]
        pub struct $name(pub(crate) $inner);

        impl $name {
            /// Writes the uncompressed encoding and returns the byte count.
            pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
                let bytes = self.to_bytes()?;
                writer.write_all(&bytes)?;
                Ok(bytes.len())
            }

            pub fn to_bytes(&self) -> Result<Vec<u8>> {
                let mut bytes = Vec::with_capacity(self.0.uncompressed_size());
                self.0.serialize_uncompressed(&mut bytes)?;
                Ok(bytes)
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                Ok(Self(<$inner>::deserialize_uncompressed(bytes)?))
            }

            /// True when the two keys do not share an encoding, i.e. they
            /// come from different setups.
            pub fn is_different(&self, other: &Self) -> bool {
                match (self.to_bytes(), other.to_bytes()) {
                    (Ok(a), Ok(b)) => a != b,
                    _ => true,
                }
            }

            pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
                let bytes = std::fs::read(path)?;
                Self::from_bytes(&bytes)
            }

            pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<usize> {
                let path = path.as_ref();
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                self.write_to(std::fs::File::create(path)?)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({} bytes)", stringify!($name), self.0.uncompressed_size())
            }
        }
    };
}

key_wrapper!(ProvingKey, ArkProvingKey<Bn254>);
key_wrapper!(VerifyingKey, ArkVerifyingKey<Bn254>);

impl ProvingKey {
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.vk.clone())
    }
}

/// Runs a fresh circuit-specific Groth16 setup.
pub fn setup_zkp(compiled: &CompiledCircuit) -> Result<(ProvingKey, VerifyingKey)> {
    let start = Instant::now();
    let (pk, vk) =
        <Groth16<Bn254> as SNARK<Fr>>::circuit_specific_setup(compiled.blank(), &mut OsRng)?;

    info!(
        constraints = compiled.num_constraints(),
        duration_ms = start.elapsed().as_millis() as u64,
        "🔑 Groth16 setup complete"
    );
    Ok((ProvingKey(pk), VerifyingKey(vk)))
}
