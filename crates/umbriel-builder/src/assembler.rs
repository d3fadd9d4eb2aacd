//! circuit input assembly
//!
//! [`TransactionBuilder::build`] is the one operation the ui calls: it takes
//! owned notes, desired outputs and the public amount, and leaves behind a
//! complete witness map plus the public values the contract will check. all
//! validation happens here, before any proving time is spent.

use tracing::{debug, info, warn};
use umbriel_crypto::{
    sealed_box, EncryptionKeypair, FieldElement, SpendingKey, ENCRYPTION_KEY_MESSAGE,
    SPENDING_KEY_MESSAGE, ZERO_LEAF_BE,
};
use umbriel_merkle::{MerkleProof, MerkleTree};
use umbriel_pool::{DummyInput, Note, N_INS, N_OUTS};

use crate::compliance::{ComplianceProver, MembershipWitness, NonMembershipWitness};
use crate::error::{BuilderError, Result};
use crate::extdata::{ExtData, ExtDataHash};
use crate::gateway::{ChainGateway, SubmittedTransaction};
use crate::signer::Signer;
use crate::witness::{CircuitInputs, MembershipSignal, NonMembershipSignal};
use crate::SMT_LEVELS;

/// an owned note to spend, with its inclusion proof
#[derive(Clone, Debug)]
pub struct SpendInput {
    pub note: Note,
    pub leaf_index: u32,
    /// proof against the current pool root; when stale the builder rebuilds
    /// the tree from events and regenerates it
    pub merkle_proof: Option<MerkleProof>,
}

/// a note to create
#[derive(Clone, Debug, Default)]
pub struct OutputRequest {
    pub amount: u64,
    /// spending public key of the recipient; none means pay to self
    pub recipient_pk: Option<FieldElement>,
    /// encryption key the sealed output is addressed to; required whenever
    /// `recipient_pk` is set
    pub recipient_enc_pk: Option<[u8; 32]>,
    /// fixed blinding (tests); none samples from the csprng
    pub blinding: Option<FieldElement>,
}

/// everything a transact call needs before proving
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    /// notes being spent; empty for a pure deposit
    pub inputs: Vec<SpendInput>,
    pub outputs: Vec<OutputRequest>,
    /// withdrawal recipient (or the sender's own address)
    pub recipient: String,
    pub ext_amount: i128,
    pub fee: u64,
    /// where the sender's registration leaf sits in the membership tree
    pub membership_leaf_index: u32,
    pub membership_blinding: FieldElement,
}

/// public values the contract checks against the proof
#[derive(Clone, Debug)]
pub struct PublicValues {
    pub root: FieldElement,
    pub public_amount: FieldElement,
    pub input_nullifiers: Vec<FieldElement>,
    pub output_commitments: Vec<FieldElement>,
    pub membership_root: FieldElement,
    pub non_membership_root: FieldElement,
}

/// the assembled transaction, ready for the prover
#[derive(Clone, Debug)]
pub struct TransactionBundle {
    pub circuit_inputs: CircuitInputs,
    pub output_notes: Vec<Note>,
    pub ext_data: ExtData,
    pub ext_data_hash: ExtDataHash,
    pub public: PublicValues,
}

impl TransactionBundle {
    /// attach proof bytes and shape the on-chain submit call
    pub fn into_submission(self, proof: Vec<u8>, sender: String) -> SubmittedTransaction {
        SubmittedTransaction {
            proof,
            root: self.public.root,
            input_nullifiers: self.public.input_nullifiers,
            output_commitment0: self.public.output_commitments[0],
            output_commitment1: self.public.output_commitments[1],
            public_amount: self.public.public_amount,
            ext_data_hash: self.ext_data_hash.bytes_be,
            asp_membership_root: self.public.membership_root,
            asp_non_membership_root: self.public.non_membership_root,
            ext_data: self.ext_data,
            sender,
        }
    }
}

/// shaped input slot: real note or dummy filler
struct InputSlot {
    note: Note,
    path_indices: u64,
    path_elements: Vec<FieldElement>,
}

/// the shielded transaction builder
pub struct TransactionBuilder {
    sk: SpendingKey,
    encryption: EncryptionKeypair,
    smt_levels: usize,
}

impl TransactionBuilder {
    pub fn new(sk: SpendingKey, encryption: EncryptionKeypair) -> Self {
        Self {
            sk,
            encryption,
            smt_levels: SMT_LEVELS,
        }
    }

    /// derive both keys from the wallet, one signature per message
    pub fn from_signer(signer: &dyn Signer) -> Result<Self> {
        let spend_sig = signer.sign_message(SPENDING_KEY_MESSAGE)?;
        let enc_sig = signer.sign_message(ENCRYPTION_KEY_MESSAGE)?;
        let sk = SpendingKey::from_signature(&spend_sig)?;
        let encryption = EncryptionKeypair::from_signature(&enc_sig)?;
        Ok(Self::new(sk, encryption))
    }

    pub fn with_smt_levels(mut self, smt_levels: usize) -> Self {
        self.smt_levels = smt_levels;
        self
    }

    pub fn public_key(&self) -> FieldElement {
        self.sk.public_key()
    }

    pub fn encryption_public_key(&self) -> [u8; 32] {
        self.encryption.public()
    }

    /// assemble the full witness for a transaction request
    pub fn build(
        &self,
        gateway: &dyn ChainGateway,
        request: &TransactionRequest,
    ) -> Result<TransactionBundle> {
        let pk = self.sk.public_key();
        let pool = gateway.read_pool_state()?;
        let levels = pool.merkle_levels as usize;

        let slots = self.shape_inputs(gateway, request, pk, levels, pool.merkle_root)?;
        let nullifiers = self.derive_nullifiers(&slots)?;
        let (output_notes, ciphertexts) = self.shape_outputs(request, pk)?;
        self.check_balance(request, &slots, &output_notes)?;

        let ext_data = ExtData {
            recipient: request.recipient.clone(),
            ext_amount: request.ext_amount,
            fee: request.fee,
            encrypted_output0: ciphertexts[0].clone(),
            encrypted_output1: ciphertexts[1].clone(),
        };
        let ext_data_hash = ext_data.hash()?;
        let public_amount = ext_data.public_amount()?;

        let compliance = ComplianceProver::sync(gateway, levels, self.smt_levels)?;
        let membership = compliance.membership_witness(
            pk,
            request.membership_blinding,
            request.membership_leaf_index,
        )?;
        let non_membership = compliance.non_membership_witness(gateway, pk)?;

        let output_commitments: Vec<FieldElement> =
            output_notes.iter().map(Note::commitment).collect();

        let circuit_inputs = self.emit_witness(
            &slots,
            &nullifiers,
            &output_notes,
            &output_commitments,
            pool.merkle_root,
            public_amount,
            ext_data_hash.field,
            &membership,
            &non_membership,
        );

        info!(
            root = %pool.merkle_root,
            public_amount = %public_amount,
            "assembled transaction witness"
        );

        Ok(TransactionBundle {
            circuit_inputs,
            output_notes,
            ext_data,
            ext_data_hash,
            public: PublicValues {
                root: pool.merkle_root,
                public_amount,
                input_nullifiers: nullifiers,
                output_commitments,
                membership_root: membership.root,
                non_membership_root: non_membership.root,
            },
        })
    }

    fn shape_inputs(
        &self,
        gateway: &dyn ChainGateway,
        request: &TransactionRequest,
        pk: FieldElement,
        levels: usize,
        pool_root: FieldElement,
    ) -> Result<Vec<InputSlot>> {
        if request.inputs.len() > N_INS {
            return Err(BuilderError::TooManySlots {
                role: "input",
                got: request.inputs.len(),
                max: N_INS,
            });
        }

        // a stale proof on any input forces one rebuild from chain events
        let mut rebuilt: Option<MerkleTree> = None;
        let mut slots = Vec::with_capacity(N_INS);

        for input in &request.inputs {
            if input.note.pk != pk {
                return Err(BuilderError::NoteNotOwned {
                    leaf_index: input.leaf_index,
                });
            }

            let commitment = input.note.commitment();
            let proof = match &input.merkle_proof {
                None => {
                    return Err(BuilderError::MissingProof {
                        leaf_index: input.leaf_index,
                    });
                }
                Some(proof) if proof.root == pool_root && proof.verify(commitment) => {
                    proof.clone()
                }
                Some(_) => {
                    warn!(
                        leaf_index = input.leaf_index,
                        "stale merkle proof, rebuilding pool tree from events"
                    );
                    if rebuilt.is_none() {
                        rebuilt = Some(rebuild_pool_tree(gateway, levels, pool_root)?);
                    }
                    let tree = rebuilt.as_ref().expect("just built");
                    if tree.leaf(input.leaf_index) != Some(commitment) {
                        return Err(BuilderError::MissingProof {
                            leaf_index: input.leaf_index,
                        });
                    }
                    tree.proof(input.leaf_index)?
                }
            };

            slots.push(InputSlot {
                note: input.note,
                path_indices: proof.path_indices,
                path_elements: proof.path_elements,
            });
        }

        // pad with dummies; they occupy slots but skip membership in-circuit
        for slot in slots.len()..N_INS {
            let dummy = DummyInput::for_slot(slot, pk);
            debug!(slot, "padding input slot with dummy");
            slots.push(InputSlot {
                note: dummy.note,
                path_indices: dummy.path_indices,
                path_elements: vec![FieldElement::ZERO; levels],
            });
        }

        Ok(slots)
    }

    fn derive_nullifiers(&self, slots: &[InputSlot]) -> Result<Vec<FieldElement>> {
        let nullifiers: Vec<FieldElement> = slots
            .iter()
            .map(|slot| slot.note.nullifier(&self.sk, slot.path_indices))
            .collect();

        for i in 0..nullifiers.len() {
            for j in (i + 1)..nullifiers.len() {
                if nullifiers[i] == nullifiers[j] {
                    return Err(BuilderError::NullifierCollision(i, j));
                }
            }
        }
        Ok(nullifiers)
    }

    fn shape_outputs(
        &self,
        request: &TransactionRequest,
        pk: FieldElement,
    ) -> Result<(Vec<Note>, Vec<Vec<u8>>)> {
        if request.outputs.len() > N_OUTS {
            return Err(BuilderError::TooManySlots {
                role: "output",
                got: request.outputs.len(),
                max: N_OUTS,
            });
        }

        let mut notes = Vec::with_capacity(N_OUTS);
        let mut ciphertexts = Vec::with_capacity(N_OUTS);

        for output in &request.outputs {
            if output.recipient_pk.is_some() && output.recipient_enc_pk.is_none() {
                return Err(BuilderError::MissingEncryptionKey);
            }
            let note = Note::new(
                output.amount,
                output.recipient_pk.unwrap_or(pk),
                output.blinding.unwrap_or_else(Note::random_blinding),
            );
            let enc_pk = output.recipient_enc_pk.unwrap_or(self.encryption.public());
            ciphertexts.push(sealed_box::encrypt_note(&enc_pk, note.amount, note.blinding)?);
            notes.push(note);
        }

        // pad with zero-value change notes back to ourselves
        while notes.len() < N_OUTS {
            let note = Note::new(0, pk, unique_blinding(&notes));
            ciphertexts.push(sealed_box::encrypt_note(
                &self.encryption.public(),
                note.amount,
                note.blinding,
            )?);
            notes.push(note);
        }

        Ok((notes, ciphertexts))
    }

    fn check_balance(
        &self,
        request: &TransactionRequest,
        slots: &[InputSlot],
        outputs: &[Note],
    ) -> Result<()> {
        let inputs: i128 = slots.iter().map(|s| i128::from(s.note.amount)).sum();
        let outputs_sum: i128 = outputs.iter().map(|n| i128::from(n.amount)).sum();
        let public = request.ext_amount - i128::from(request.fee);

        if inputs + public != outputs_sum {
            return Err(BuilderError::Unbalanced {
                inputs,
                public,
                outputs: outputs_sum,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_witness(
        &self,
        slots: &[InputSlot],
        nullifiers: &[FieldElement],
        output_notes: &[Note],
        output_commitments: &[FieldElement],
        root: FieldElement,
        public_amount: FieldElement,
        ext_data_hash: FieldElement,
        membership: &MembershipWitness,
        non_membership: &NonMembershipWitness,
    ) -> CircuitInputs {
        let mut inputs = CircuitInputs::new();

        inputs.set_field("root", root);
        inputs.set_field("publicAmount", public_amount);
        inputs.set_field("extDataHash", ext_data_hash);

        inputs.set_fields("inputNullifier", nullifiers);
        inputs.set_fields(
            "inAmount",
            &slots
                .iter()
                .map(|s| FieldElement::from_u64(s.note.amount))
                .collect::<Vec<_>>(),
        );
        inputs.set_fields("inPrivateKey", &vec![self.sk.as_field(); slots.len()]);
        inputs.set_fields(
            "inBlinding",
            &slots.iter().map(|s| s.note.blinding).collect::<Vec<_>>(),
        );
        inputs.set_fields(
            "inPathIndices",
            &slots
                .iter()
                .map(|s| FieldElement::from_u64(s.path_indices))
                .collect::<Vec<_>>(),
        );
        inputs.set_matrix(
            "inPathElements",
            &slots
                .iter()
                .map(|s| s.path_elements.clone())
                .collect::<Vec<_>>(),
        );

        inputs.set_fields("outputCommitment", output_commitments);
        inputs.set_fields(
            "outAmount",
            &output_notes
                .iter()
                .map(|n| FieldElement::from_u64(n.amount))
                .collect::<Vec<_>>(),
        );
        inputs.set_fields(
            "outPubkey",
            &output_notes.iter().map(|n| n.pk).collect::<Vec<_>>(),
        );
        inputs.set_fields(
            "outBlinding",
            &output_notes.iter().map(|n| n.blinding).collect::<Vec<_>>(),
        );

        // one historical root per input: the circuit takes a singleton list
        let n_ins = slots.len();
        inputs.set_matrix("membershipRoots", &vec![vec![membership.root]; n_ins]);
        inputs.set_matrix(
            "nonMembershipRoots",
            &vec![vec![non_membership.root]; n_ins],
        );

        let membership_signal = MembershipSignal {
            leaf: membership.leaf.to_decimal(),
            blinding: membership.blinding.to_decimal(),
            path_indices: FieldElement::from_u64(membership.path_indices).to_decimal(),
            path_elements: membership
                .path_elements
                .iter()
                .map(FieldElement::to_decimal)
                .collect(),
        };
        let non_membership_signal = NonMembershipSignal {
            key: non_membership.key.to_decimal(),
            old_key: non_membership.old_key.to_decimal(),
            old_value: non_membership.old_value.to_decimal(),
            is_old0: if non_membership.is_old_zero { "1" } else { "0" }.into(),
            siblings: non_membership
                .siblings
                .iter()
                .map(FieldElement::to_decimal)
                .collect(),
        };

        let membership_value = serde_json::to_value(vec![
            vec![membership_signal];
            n_ins
        ])
        .expect("signal structs serialize");
        let non_membership_value = serde_json::to_value(vec![
            vec![non_membership_signal];
            n_ins
        ])
        .expect("signal structs serialize");
        inputs.set_value("membershipProofs", membership_value);
        inputs.set_value("nonMembershipProofs", non_membership_value);

        inputs
    }
}

/// rebuild the pool tree from commitment events and check it against the
/// on-chain root
fn rebuild_pool_tree(
    gateway: &dyn ChainGateway,
    levels: usize,
    expected_root: FieldElement,
) -> Result<MerkleTree> {
    let zero = FieldElement::from_be_bytes(&ZERO_LEAF_BE)?;
    let events = gateway.commitment_events(usize::MAX)?;
    let leaves: Vec<(u32, FieldElement)> = events
        .iter()
        .map(|e| (e.leaf_index, e.commitment))
        .collect();
    let tree = MerkleTree::from_leaves(levels, zero, &leaves)?;

    if tree.root() != expected_root {
        return Err(BuilderError::RootMismatch {
            chain: expected_root.to_hex(),
            proof: tree.root().to_hex(),
        });
    }
    Ok(tree)
}

/// sample a blinding distinct from every note already shaped
fn unique_blinding(existing: &[Note]) -> FieldElement {
    loop {
        let candidate = Note::random_blinding();
        if existing.iter().all(|n| n.blinding != candidate) {
            return candidate;
        }
    }
}
