//! Signatures of native functions, described with layouts.

use memseg_common::{Result, error::Error};

use crate::layout::MemoryLayout;

/// The shape of a native function: an optional return layout and the
/// argument layouts, in order.
///
/// This is what a native call layer consumes to lay out argument and return
/// buffers. Padding layouts are not values and cannot appear in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    return_layout: Option<MemoryLayout>,
    arguments: Vec<MemoryLayout>,
}

impl FunctionDescriptor {
    pub fn of<I>(return_layout: impl Into<MemoryLayout>, arguments: I) -> Result<FunctionDescriptor>
    where
        I: IntoIterator,
        I::Item: Into<MemoryLayout>,
    {
        let return_layout = return_layout.into();
        check_carrier(&return_layout)?;
        Ok(FunctionDescriptor {
            return_layout: Some(return_layout),
            arguments: collect_arguments(arguments)?,
        })
    }

    pub fn of_void<I>(arguments: I) -> Result<FunctionDescriptor>
    where
        I: IntoIterator,
        I::Item: Into<MemoryLayout>,
    {
        Ok(FunctionDescriptor {
            return_layout: None,
            arguments: collect_arguments(arguments)?,
        })
    }

    pub fn return_layout(&self) -> Option<&MemoryLayout> {
        self.return_layout.as_ref()
    }

    pub fn argument_layouts(&self) -> &[MemoryLayout] {
        &self.arguments
    }

    pub fn append_argument_layouts<I>(&self, arguments: I) -> Result<FunctionDescriptor>
    where
        I: IntoIterator,
        I::Item: Into<MemoryLayout>,
    {
        self.insert_argument_layouts(self.arguments.len(), arguments)
    }

    /// Inserts `arguments` before the argument at `index`.
    pub fn insert_argument_layouts<I>(&self, index: usize, arguments: I) -> Result<FunctionDescriptor>
    where
        I: IntoIterator,
        I::Item: Into<MemoryLayout>,
    {
        if index > self.arguments.len() {
            return Err(Error::index_out_of_bounds(
                index as u64,
                self.arguments.len() as u64 + 1,
            ));
        }
        let mut all = self.arguments.clone();
        all.splice(index..index, collect_arguments(arguments)?);
        Ok(FunctionDescriptor {
            return_layout: self.return_layout.clone(),
            arguments: all,
        })
    }

    pub fn change_return_layout(&self, return_layout: impl Into<MemoryLayout>) -> Result<FunctionDescriptor> {
        let return_layout = return_layout.into();
        check_carrier(&return_layout)?;
        Ok(FunctionDescriptor {
            return_layout: Some(return_layout),
            arguments: self.arguments.clone(),
        })
    }

    pub fn drop_return_layout(&self) -> FunctionDescriptor {
        FunctionDescriptor {
            return_layout: None,
            arguments: self.arguments.clone(),
        }
    }
}

impl std::fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for argument in &self.arguments {
            write!(f, "{argument}")?;
        }
        f.write_str(")")?;
        match &self.return_layout {
            Some(layout) => write!(f, "{layout}"),
            None => f.write_str("v"),
        }
    }
}

fn collect_arguments<I>(arguments: I) -> Result<Vec<MemoryLayout>>
where
    I: IntoIterator,
    I::Item: Into<MemoryLayout>,
{
    arguments
        .into_iter()
        .map(|argument| {
            let argument = argument.into();
            check_carrier(&argument).map(|()| argument)
        })
        .collect()
}

fn check_carrier(layout: &MemoryLayout) -> Result<()> {
    if layout.is_padding() {
        return Err(Error::invalid_arg(
            "layout",
            format!("padding layout {layout} cannot be passed or returned"),
        ));
    }
    Ok(())
}
