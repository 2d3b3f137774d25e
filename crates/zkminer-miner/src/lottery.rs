use crate::codec::{ByteReader, ByteWriter};
use crate::error::{MinerError, Result};
use zkminer_crypto::{address_from_public_key, keccak256, verify_signature};
use zkminer_problem::VerifyingKey;
use zkminer_types::{Address, Hash, Header, Height, PublicKey, Signature, ADDRESS_LENGTH, ZERO_HASH};
use zkminer_vrf::{select_challenge_index, VrfPublicKey};

/// Preimage the eligibility proof is built over.
pub fn eligibility_preimage(miner_addr: &Address, challenge_header_hash: &Hash) -> [u8; 32] {
    keccak256(&[miner_addr.as_bytes(), challenge_header_hash])
}

/// The signed claim a miner submits for one round.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LotteryTicket {
    pub miner_addr: Address,
    pub vrf_index: Vec<u8>,
    pub vrf_proof: Vec<u8>,
    pub challenge_header_hash: Hash,
    pub mimc_hash: Vec<u8>,
    pub zkp_proof: Vec<u8>,
    pub signature: Signature,
}

/// Everything a verifier needs besides the ticket itself.
#[derive(Debug, Clone, Copy)]
pub struct TicketContext<'a> {
    pub public_key: &'a PublicKey,
    pub vrf_public_key: &'a VrfPublicKey,
    pub verifying_key: &'a VerifyingKey,
    pub last_coinbase_height: Height,
    pub last_coinbase_hash: &'a Hash,
    pub challenge_header: &'a Header,
    pub challenge_range: u64,
}

impl LotteryTicket {
    /// True once every field, signature included, is populated.
    pub fn is_complete(&self) -> bool {
        !self.miner_addr.is_zero()
            && !self.vrf_index.is_empty()
            && !self.vrf_proof.is_empty()
            && self.challenge_header_hash != ZERO_HASH
            && !self.mimc_hash.is_empty()
            && !self.zkp_proof.is_empty()
            && !self.signature.is_empty()
    }

    /// Canonical encoding of every field except the signature:
    /// `addr(20) | index | vrf_proof | challenge_hash(32) | mimc_hash | zkp_proof`,
    /// variable fields prefixed with a big-endian u32 length.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(
            ADDRESS_LENGTH
                + 32
                + 16
                + self.vrf_index.len()
                + self.vrf_proof.len()
                + self.mimc_hash.len()
                + self.zkp_proof.len(),
        );
        writer.put_fixed(self.miner_addr.as_bytes());
        writer.put_var("vrf_index", &self.vrf_index)?;
        writer.put_var("vrf_proof", &self.vrf_proof)?;
        writer.put_fixed(&self.challenge_header_hash);
        writer.put_var("mimc_hash", &self.mimc_hash)?;
        writer.put_var("zkp_proof", &self.zkp_proof)?;
        Ok(writer.into_bytes())
    }

    pub fn signing_digest(&self) -> Result<[u8; 32]> {
        Ok(keccak256(&[&self.signable_bytes()?]))
    }

    /// Wire form: signable bytes followed by the length-prefixed signature.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::default();
        writer.put_fixed(&self.signable_bytes()?);
        writer.put_var("signature", self.signature.as_bytes())?;
        Ok(writer.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let miner_addr = Address::from_bytes(reader.read_array::<ADDRESS_LENGTH>("miner_addr")?);
        let vrf_index = reader.read_var("vrf_index")?;
        let vrf_proof = reader.read_var("vrf_proof")?;
        let challenge_header_hash = reader.read_array::<32>("challenge_header_hash")?;
        let mimc_hash = reader.read_var("mimc_hash")?;
        let zkp_proof = reader.read_var("zkp_proof")?;
        let signature = Signature::new(reader.read_var("signature")?);
        reader.finish()?;

        Ok(Self {
            miner_addr,
            vrf_index,
            vrf_proof,
            challenge_header_hash,
            mimc_hash,
            zkp_proof,
            signature,
        })
    }

    /// Full validator-side check of a submitted ticket.
    pub fn verify(&self, ctx: &TicketContext<'_>) -> Result<()> {
        if !self.is_complete() {
            return Err(MinerError::InvalidTicket("incomplete ticket".to_string()));
        }
        if address_from_public_key(ctx.public_key) != self.miner_addr {
            return Err(MinerError::InvalidTicket(
                "miner address does not match public key".to_string(),
            ));
        }

        verify_signature(ctx.public_key, &self.signing_digest()?, &self.signature)?;

        if !zkminer_vrf::verify(
            ctx.vrf_public_key,
            ctx.last_coinbase_hash,
            &self.vrf_index,
            &self.vrf_proof,
        ) {
            return Err(MinerError::InvalidTicket("VRF proof rejected".to_string()));
        }

        let index = select_challenge_index(&self.vrf_index, ctx.challenge_range)?;
        let expected_height = ctx.last_coinbase_height + index;
        if ctx.challenge_header.number != expected_height
            || ctx.challenge_header.hash != self.challenge_header_hash
        {
            return Err(MinerError::InvalidTicket(format!(
                "challenge header mismatch: expected height {expected_height}"
            )));
        }

        let preimage = eligibility_preimage(&self.miner_addr, &self.challenge_header_hash);
        if !zkminer_problem::verify(ctx.verifying_key, &preimage, &self.mimc_hash, &self.zkp_proof)
        {
            return Err(MinerError::InvalidTicket("zk proof rejected".to_string()));
        }
        Ok(())
    }
}
