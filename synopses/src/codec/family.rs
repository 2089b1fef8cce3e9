// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::error::Error;

/// Defines the various families of sketch and set operation classes.
///
/// A family defines a set of classes that share fundamental algorithms and behaviors. The classes
/// within a family may still differ by how they are stored and accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
    /// The minimum preamble size for this family, in the family's own preamble units.
    pub min_pre_longs: u8,
    /// The maximum preamble size for this family, in the family's own preamble units.
    pub max_pre_longs: u8,
}

impl Family {
    /// The HLL family of sketches. Preamble measured in 4-byte ints.
    pub const HLL: Family = Family {
        id: 7,
        name: "HLL",
        min_pre_longs: 2,
        max_pre_longs: 10,
    };

    /// The Frequency family of sketches. Preamble measured in 8-byte longs.
    pub const FREQUENCY: Family = Family {
        id: 10,
        name: "FREQUENCY",
        min_pre_longs: 1,
        max_pre_longs: 4,
    };

    /// Compressed Probabilistic Counting (CPC) Sketch. Preamble measured in 4-byte ints.
    pub const CPC: Family = Family {
        id: 16,
        name: "CPC",
        min_pre_longs: 2,
        max_pre_longs: 9,
    };
}

impl Family {
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }

    pub fn validate_preamble_size(&self, preamble: u8) -> Result<(), Error> {
        if (self.min_pre_longs..=self.max_pre_longs).contains(&preamble) {
            Ok(())
        } else {
            Err(Error::deserial(format!(
                "{} preamble size out of range [{}, {}]: {preamble}",
                self.name, self.min_pre_longs, self.max_pre_longs
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_id() {
        assert!(Family::CPC.validate_id(16).is_ok());
        let err = Family::HLL.validate_id(16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);
        assert!(err.message().contains("HLL"));
    }

    #[test]
    fn test_validate_preamble_size() {
        assert!(Family::FREQUENCY.validate_preamble_size(1).is_ok());
        assert!(Family::FREQUENCY.validate_preamble_size(4).is_ok());
        assert!(Family::FREQUENCY.validate_preamble_size(0).is_err());
        assert!(Family::HLL.validate_preamble_size(11).is_err());
    }
}
